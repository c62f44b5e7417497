use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use lease_core::LeaseError;
use serde::Serialize;

use crate::error::{ApiError, ErrorBody};
use crate::handlers::owner_from_jar;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    message: String,
    new_expiration_time: DateTime<Utc>,
}

pub async fn extend(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(owner) = owner_from_jar(&jar) else {
        return no_lease_response();
    };

    match state.manager.extend(&owner).await {
        Ok(outcome) => Json(ExtendResponse {
            message: "lease extended".to_string(),
            new_expiration_time: outcome.new_expiration,
        })
        .into_response(),
        Err(LeaseError::NotFound) => no_lease_response(),
        Err(other) => ApiError::from(other).into_response(),
    }
}

fn no_lease_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: "you don't have an active lease".to_string() }),
    )
        .into_response()
}
