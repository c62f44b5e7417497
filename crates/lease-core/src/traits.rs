use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::LeaseError;
use crate::models::Lease;

/// Host-port to container-port mapping plus everything needed to start a
/// sandbox workload. The runtime adapter never persists this; it is built
/// fresh for each create call.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub host_port: u16,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
    pub network_name: String,
    pub memory_limit_bytes: u64,
    pub memory_swap_limit_bytes: u64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub pids_limit: i64,
    pub read_only_rootfs: bool,
    pub no_new_privileges: bool,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub tmpfs: Option<(String, String)>,
    pub hostname: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Running,
    Stopped,
    NotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct HandleStatus {
    pub state: HandleState,
    pub running: bool,
}

impl HandleStatus {
    pub fn not_found() -> Self {
        Self {
            state: HandleState::NotFound,
            running: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HandleStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Thin contract over the container runtime. The only component in the
/// system that talks to the runtime; never persists state.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<RuntimeHandle, LeaseError>;
    async fn remove(&self, handle_id: &str) -> Result<(), LeaseError>;
    async fn status(&self, handle_id: &str) -> Result<HandleStatus, LeaseError>;
    async fn restart(&self, handle_id: &str) -> Result<(), LeaseError>;
    async fn stats(&self, handle_id: &str) -> Result<HandleStats, LeaseError>;
    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<RuntimeHandle>, LeaseError>;
}

/// Maintains the authoritative set of host ports and their allocation
/// status; issues atomic reservations.
#[async_trait]
pub trait PortRegistry: Send + Sync {
    async fn allocate(
        &self,
        holder_id: &str,
        blocked: &HashSet<u16>,
    ) -> Result<Option<u16>, LeaseError>;
    /// Repoints a reserved slot's holder id, used once the runtime handle
    /// id is known (the id `allocate` was called with is only a
    /// provisional container name chosen before the runtime call).
    async fn set_holder(&self, port: u16, holder_id: &str) -> Result<(), LeaseError>;
    async fn release(&self, port: u16) -> Result<(), LeaseError>;
    async fn is_allocated(&self, port: u16) -> Result<bool, LeaseError>;
    async fn sweep_stale(&self, max_age: chrono::Duration) -> Result<u32, LeaseError>;
}

/// Durable record of active leases and recent admission events.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn insert_lease(&self, lease: &Lease) -> Result<(), LeaseError>;
    async fn get_lease_by_owner(&self, owner: &str) -> Result<Option<Lease>, LeaseError>;
    async fn get_lease_by_id(&self, id: &str) -> Result<Option<Lease>, LeaseError>;
    async fn update_expires_at(&self, id: &str, new_ts: DateTime<Utc>) -> Result<(), LeaseError>;
    async fn delete_lease(&self, id: &str) -> Result<(), LeaseError>;
    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Lease>, LeaseError>;
    async fn scan_all(&self) -> Result<Vec<Lease>, LeaseError>;
    async fn count_leases(&self) -> Result<u32, LeaseError>;
    async fn count_leases_by_client(&self, client_addr: &str) -> Result<u32, LeaseError>;
    async fn record_rate_event(
        &self,
        client_addr: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), LeaseError>;
    async fn count_rate_events(
        &self,
        client_addr: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, LeaseError>;
    async fn prune_rate_events(&self, before: DateTime<Utc>) -> Result<(), LeaseError>;
}

/// One-time-use, TTL'd challenge/response collaborator. Image rendering
/// itself is out of scope; this returns an opaque challenge string.
#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    async fn issue(&self) -> (String, String);
    async fn verify(&self, id: &str, answer: &str) -> bool;
}
