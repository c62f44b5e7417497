use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
    service: String,
    challenge: String,
}

/// Public, unauthenticated service status (`spec.md` §6 `GET /status`) —
/// not to be confused with a per-owner lease lookup, which isn't part of
/// the documented interface.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        service: state.compose_project_name.clone(),
        challenge: state.images_name.clone(),
    })
}
