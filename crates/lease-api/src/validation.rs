//! Request-shape validation for the handful of fields the HTTP layer
//! touches directly. Owner identity comes from a server-set cookie, so
//! there is no password/email surface to validate here.

/// A `user_uuid` cookie value is accepted as an owner identifier only if
/// it looks like a UUID we would have generated ourselves. Anything else
/// (missing, empty, absurdly long) is treated as no session, which sends
/// the caller down the "set a fresh cookie" path rather than erroring.
pub fn is_plausible_owner(value: &str) -> bool {
    !value.is_empty() && value.len() <= 64 && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// CAPTCHA id/answer are opaque strings from `InMemoryCaptchaProvider`;
/// the only validation that makes sense here is a sane length bound so a
/// client can't post a multi-megabyte field.
pub fn is_plausible_captcha_field(value: &str) -> bool {
    !value.is_empty() && value.len() <= 256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_owner() {
        assert!(!is_plausible_owner(""));
        assert!(!is_plausible_owner(&"a".repeat(65)));
    }

    #[test]
    fn accepts_uuid_shaped_owner() {
        assert!(is_plausible_owner("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
    }

    #[test]
    fn rejects_owner_with_unexpected_characters() {
        assert!(!is_plausible_owner("../../etc/passwd"));
        assert!(!is_plausible_owner("owner;drop table"));
    }
}
