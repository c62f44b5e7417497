use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::AppState;

/// `GET /logs`, admin-gated. Log output itself is out of scope (`spec.md`
/// §1 excludes the HTTP handlers' surrounding concerns); this endpoint
/// reports where logs actually go rather than replaying them, and is
/// disabled entirely (404) unless explicitly turned on.
pub async fn logs(State(state): State<AppState>) -> Response {
    if !state.enable_logs_endpoint {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "logs endpoint disabled" })),
        )
            .into_response();
    }

    Json(json!({
        "message": "structured logs are emitted as JSON to stdout, not retained by this endpoint",
    }))
    .into_response()
}
