pub mod admin_status;
pub mod captcha;
pub mod deploy;
pub mod extend;
pub mod health;
pub mod index;
pub mod logs;
pub mod metrics;
pub mod restart;
pub mod status;
pub mod stop;

use axum_extra::extract::cookie::{Cookie, CookieJar};

pub const OWNER_COOKIE: &str = "user_uuid";

/// Returns the existing owner cookie value if it looks like one we issued,
/// otherwise `None` so the caller mints a fresh one.
pub fn owner_from_jar(jar: &CookieJar) -> Option<String> {
    jar.get(OWNER_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| crate::validation::is_plausible_owner(v))
}

/// Ensures the response jar carries a `user_uuid` cookie, minting one from
/// a fresh UUID if the request didn't already have a usable one. Returns
/// the owner value to use for this request alongside the jar to send back.
pub fn ensure_owner_cookie(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(owner) = owner_from_jar(&jar) {
        return (jar, owner);
    }

    let owner = uuid::Uuid::new_v4().to_string();
    let mut cookie = Cookie::new(OWNER_COOKIE, owner.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    let jar = jar.add(cookie);
    (jar, owner)
}
