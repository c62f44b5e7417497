use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::handlers::ensure_owner_cookie;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub captcha_id: Option<String>,
    pub captcha_answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    message: String,
    port: i32,
    id: String,
    expiration_time: DateTime<Utc>,
}

pub async fn deploy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    Json(body): Json<DeployRequest>,
) -> Result<(CookieJar, Json<DeployResponse>), ApiError> {
    let (jar, owner) = ensure_owner_cookie(jar, state.cookie_secure);
    let client_addr = addr.ip().to_string();

    let outcome = state
        .manager
        .create(
            &owner,
            &client_addr,
            body.captcha_id.as_deref(),
            body.captcha_answer.as_deref(),
        )
        .await?;

    let lease = outcome.lease;
    Ok((
        jar,
        Json(DeployResponse {
            message: "sandbox deployed".to_string(),
            port: lease.port,
            id: lease.id,
            expiration_time: lease.expires_at,
        }),
    ))
}
