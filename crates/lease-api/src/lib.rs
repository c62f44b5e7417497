//! HTTP surface for the sandbox lease manager (`spec.md` §6). Thin axum
//! handlers that translate HTTP requests into `lease_core::LeaseManager`
//! calls and map `LeaseError` into the stable `{error: ...}` / status-code
//! contract; no lease-lifecycle logic lives in this crate.

use std::sync::Arc;

use axum::Router;
use lease_core::{AdmissionSnapshot, CaptchaProvider, LeaseManager, LeaseStore};
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;
use tokio::sync::RwLock;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod validation;

/// Everything the HTTP layer needs, built once at startup and shared by
/// `Arc` across request-handler contexts. No process-wide singleton is
/// reached into from a handler; every collaborator comes through this
/// struct, following `spec.md` §9's `SystemState` design note.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LeaseManager>,
    pub store: Arc<dyn LeaseStore>,
    pub captcha: Arc<dyn CaptchaProvider>,
    pub snapshot: Arc<RwLock<Option<AdmissionSnapshot>>>,
    pub metrics_handle: PrometheusHandle,
    pub admin_key: SecretString,
    pub images_name: String,
    pub compose_project_name: String,
    pub cookie_secure: bool,
    pub enable_logs_endpoint: bool,
}

pub fn app(state: AppState) -> Router {
    router::api_router(state)
}
