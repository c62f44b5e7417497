//! Error mapping (`spec.md` §7): every `LeaseError` becomes a stable status
//! code and a `{error: ...}` JSON body. Internal errors never leak stack
//! traces or SQL fragments — `StoreError`'s message is always the fixed
//! string below, never the underlying `sqlx::Error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lease_core::LeaseError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(pub LeaseError);

impl From<LeaseError> for ApiError {
    fn from(inner: LeaseError) -> Self {
        ApiError(inner)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            LeaseError::InvalidSession => {
                (StatusCode::BAD_REQUEST, "missing or invalid session".to_string())
            }
            LeaseError::CaptchaInvalid => {
                (StatusCode::BAD_REQUEST, "captcha missing, expired, or wrong".to_string())
            }
            LeaseError::DuplicateLease => {
                (StatusCode::BAD_REQUEST, "you already have an active lease".to_string())
            }
            LeaseError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded, try again later".to_string())
            }
            LeaseError::NoPorts => {
                (StatusCode::SERVICE_UNAVAILABLE, "no ports available, try again shortly".to_string())
            }
            LeaseError::ResourceExhausted { dimension } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("resource limit reached: {dimension}"),
            ),
            LeaseError::RuntimeError { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to start sandbox, try again".to_string(),
            ),
            LeaseError::StoreError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error, try again".to_string())
            }
            LeaseError::NotFound => {
                (StatusCode::NOT_FOUND, "you don't have an active lease".to_string())
            }
            LeaseError::Unauthorized => {
                (StatusCode::FORBIDDEN, "not authorized".to_string())
            }
        };

        if matches!(self.0, LeaseError::RuntimeError { .. } | LeaseError::StoreError) {
            tracing::error!(error = %self.0, "internal error surfaced to client");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
