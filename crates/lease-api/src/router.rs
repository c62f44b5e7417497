//! Route assembly (`spec.md` §6). Admin endpoints get the loopback/RFC1918
//! gate layered on top; every route gets request-id propagation, security
//! headers, and request tracing, mirroring the teacher's middleware stack.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::admin_status::admin_status;
use crate::handlers::captcha::get_captcha;
use crate::handlers::deploy::deploy;
use crate::handlers::extend::extend;
use crate::handlers::health::health;
use crate::handlers::index::index;
use crate::handlers::logs::logs;
use crate::handlers::metrics::metrics;
use crate::handlers::restart::restart;
use crate::handlers::status::status;
use crate::handlers::stop::stop;
use crate::middleware::{admin_gate, request_id_middleware, security_headers_middleware};
use crate::AppState;

pub fn api_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/metrics", get(metrics))
        .route("/logs", get(logs))
        .route("/admin/status", get(admin_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_gate));

    let public = Router::new()
        .route("/", get(index))
        .route("/get_captcha", get(get_captcha))
        .route("/deploy", post(deploy))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
        .route("/extend", post(extend))
        .route("/status", get(status))
        .route("/health", get(health));

    public
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
