use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::AppState;

/// `GET /metrics`, admin-gated. Renders the Prometheus text-exposition
/// format through the recorder installed at startup.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics_handle.render();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
