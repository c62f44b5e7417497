use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The central entity: one per active workload.
///
/// Invariant: exactly one `Lease` exists per (active) `owner`; exactly one
/// `Lease` references any given allocated `port`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lease {
    pub id: String,
    pub port: i32,
    pub owner: String,
    pub client_addr: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
