use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CaptchaResponse {
    captcha_id: String,
    captcha_image: String,
}

pub async fn get_captcha(State(state): State<AppState>) -> Json<CaptchaResponse> {
    let (captcha_id, challenge) = state.captcha.issue().await;
    Json(CaptchaResponse {
        captcha_id,
        captcha_image: challenge,
    })
}
