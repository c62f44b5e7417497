use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use lease_core::LeaseError;
use serde::Serialize;

use crate::error::{ApiError, ErrorBody};
use crate::handlers::owner_from_jar;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StopResponse {
    message: String,
}

/// `spec.md` §6: failure is 400 "no-lease", distinct from the 404 the
/// generic `ApiError` mapping gives `NotFound` elsewhere (e.g. `/restart`'s
/// handle-gone case), so this handler maps the error itself instead of
/// deferring to `ApiError`'s blanket status.
pub async fn stop(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(owner) = owner_from_jar(&jar) else {
        return no_lease_response();
    };

    match state.manager.stop(&owner).await {
        Ok(()) => Json(StopResponse { message: "sandbox stopped".to_string() }).into_response(),
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
