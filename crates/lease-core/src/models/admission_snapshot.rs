use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ephemeral, in-memory, refreshed by the Resource Monitor. Stale after
/// `3 * RESOURCE_CHECK_INTERVAL`; consumers may force a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    pub lease_count: u32,
    pub cpu_percent: f64,
    pub memory_gb: f64,
    pub max_containers: u32,
    pub max_cpu_percent: u32,
    pub max_memory_gb: f64,
    pub sampled_at: DateTime<Utc>,
}

impl AdmissionSnapshot {
    pub fn is_stale(&self, now: DateTime<Utc>, check_interval: chrono::Duration) -> bool {
        now - self.sampled_at > check_interval * 3
    }

    /// Whether admitting one more lease would exceed any configured limit.
    /// Returns the first dimension that would be exceeded.
    pub fn would_exceed(&self) -> Option<&'static str> {
        if self.lease_count + 1 > self.max_containers {
            return Some("containers");
        }
        if self.cpu_percent > self.max_cpu_percent as f64 {
            return Some("cpu");
        }
        if self.memory_gb > self.max_memory_gb {
            return Some("memory");
        }
        None
    }
}
