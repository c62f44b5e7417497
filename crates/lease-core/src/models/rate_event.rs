use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One per admission check that was admitted to the rate-limit stage,
/// regardless of whether downstream stages accepted it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateEvent {
    pub client_addr: String,
    pub request_time: DateTime<Utc>,
}
