use axum::extract::State;
use axum::Json;
use lease_core::AdmissionSnapshot;
use serde::Serialize;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AdminStatusResponse {
    active_leases: u32,
    snapshot: Option<AdmissionSnapshot>,
    compose_project_name: String,
    images_name: String,
}

/// `GET /admin/status`, admin-gated. Detailed operational view: current
/// lease count straight from the store (authoritative) plus the most
/// recent Resource Monitor snapshot (may be stale, never blocking).
pub async fn admin_status(State(state): State<AppState>) -> Result<Json<AdminStatusResponse>, ApiError> {
    let active_leases = state.store.count_leases().await?;
    let snapshot = state.snapshot.read().await.clone();

    Ok(Json(AdminStatusResponse {
        active_leases,
        snapshot,
        compose_project_name: state.compose_project_name.clone(),
        images_name: state.images_name.clone(),
    }))
}
