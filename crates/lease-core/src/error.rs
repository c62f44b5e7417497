//! Error types for the lease manager core

use thiserror::Error;

/// Error kinds the core distinguishes. Background sweepers never propagate
/// these; they log and continue.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("missing owner session")]
    InvalidSession,

    #[error("captcha missing, expired, or wrong")]
    CaptchaInvalid,

    #[error("rate limit exceeded for this client")]
    RateLimited,

    #[error("owner already holds a lease")]
    DuplicateLease,

    #[error("no ports available after retries")]
    NoPorts,

    #[error("resource quota exhausted: {dimension}")]
    ResourceExhausted { dimension: String },

    #[error("container runtime error: {cause}")]
    RuntimeError { cause: String },

    #[error("persistent store error")]
    StoreError,

    #[error("lease or handle not found")]
    NotFound,

    #[error("admin endpoint reached without a valid key from a non-local source")]
    Unauthorized,
}

impl From<sqlx::Error> for LeaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LeaseError::NotFound,
            other => {
                tracing::error!(error = %other, "store operation failed");
                LeaseError::StoreError
            }
        }
    }
}

impl LeaseError {
    /// True for failures that the caller may retry after a backoff, as
    /// opposed to logical errors (duplicate key, invalid input) that will
    /// never succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LeaseError::StoreError)
    }
}
