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
pub struct RestartResponse {
    message: String,
}

/// `spec.md` §6 distinguishes "no-lease" (400, this owner never had one)
/// from "handle-gone" (404, the lease row exists but the runtime handle
/// doesn't) even though both surface from the core as `LeaseError::NotFound`.
/// The lookup below happens here, not in `lease_core`, purely to recover
/// that distinction for the HTTP status code.
pub async fn restart(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(owner) = owner_from_jar(&jar) else {
        return status_response(StatusCode::BAD_REQUEST, "you don't have an active lease");
    };

    match state.store.get_lease_by_owner(&owner).await {
        Ok(None) => return status_response(StatusCode::BAD_REQUEST, "you don't have an active lease"),
        Ok(Some(_)) => {}
        Err(err) => return ApiError::from(err).into_response(),
    }

    match state.manager.restart(&owner).await {
        Ok(()) => Json(RestartResponse { message: "sandbox restarted".to_string() }).into_response(),
        Err(LeaseError::NotFound) => status_response(StatusCode::NOT_FOUND, "sandbox handle no longer exists"),
        Err(other) => ApiError::from(other).into_response(),
    }
}

fn status_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody { error: message.to_string() })).into_response()
}
