use std::future::Future;
use std::time::Duration as StdDuration;

use tokio::time::sleep;

const BACKOFFS_MS: [u64; 3] = [500, 1000, 2000];

/// Retries a store operation up to 3 times with 0.5s/1s/2s backoff, but
/// only for transient connection-level failures. Logical errors (unique
/// key violation, invalid input) are returned immediately.
pub async fn retry_transient<F, Fut, T>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut last_err = None;
    for backoff_ms in BACKOFFS_MS.iter().copied().chain(std::iter::once(0)) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                last_err = Some(err);
                if backoff_ms > 0 {
                    sleep(StdDuration::from_millis(backoff_ms)).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_)
    )
}
