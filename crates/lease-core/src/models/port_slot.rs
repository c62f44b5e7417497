use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortState {
    Free,
    Reserved,
}

/// One per port in the configured range.
///
/// Invariant: `state == Reserved` implies `holder` is set; a reserved slot
/// older than `STALE_PORT_MAX_AGE` with no matching lease is orphaned and
/// must be released by the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSlot {
    pub port: u16,
    pub state: PortState,
    pub holder: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
}

impl PortSlot {
    pub fn free(port: u16) -> Self {
        Self {
            port,
            state: PortState::Free,
            holder: None,
            reserved_at: None,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match (self.state, self.reserved_at) {
            (PortState::Reserved, Some(reserved_at)) => now - reserved_at > max_age,
            _ => false,
        }
    }
}
