use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use metrics::counter;
use rand::Rng;
use tokio::time::sleep;

use crate::admission::{AdmissionController, AdmitRequest};
use crate::error::LeaseError;
use crate::models::Lease;
use crate::traits::{ContainerSpec, LeaseStore, PortRegistry, RuntimeAdapter};

/// Parameters the Lease Manager needs beyond its collaborators. Kept
/// separate from any configuration-loading crate so this crate has no
/// dependency on how settings are sourced.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub compose_project_name: String,
    pub image: String,
    pub flag: String,
    pub port_in_container: u16,
    pub network_name: String,
    pub leave_time: chrono::Duration,
    pub add_time: chrono::Duration,
    pub port_allocation_max_attempts: u32,
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
    pub maintenance_batch_size: usize,
    pub stale_port_max_age: chrono::Duration,
    pub shutdown_deadline: chrono::Duration,
}

pub struct DeployOutcome {
    pub lease: Lease,
}

pub struct ExtendOutcome {
    pub new_expiration: chrono::DateTime<Utc>,
}

/// Orchestrator: composes the Port Registry, Lease Store, Runtime Adapter
/// and Admission Controller into the user-visible create/extend/stop/
/// restart operations, plus the two background sweeps.
pub struct LeaseManager {
    ports: Arc<dyn PortRegistry>,
    store: Arc<dyn LeaseStore>,
    runtime: Arc<dyn RuntimeAdapter>,
    admission: Arc<AdmissionController>,
    config: ManagerConfig,
}

impl LeaseManager {
    pub fn new(
        ports: Arc<dyn PortRegistry>,
        store: Arc<dyn LeaseStore>,
        runtime: Arc<dyn RuntimeAdapter>,
        admission: Arc<AdmissionController>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            ports,
            store,
            runtime,
            admission,
            config,
        }
    }

    fn container_name(&self, owner: &str) -> String {
        let safe_owner = owner.replace('-', "_");
        let ts = Utc::now().timestamp();
        let suffix = random_suffix(4);
        format!(
            "{}_session_{}_{}_{}",
            self.config.compose_project_name, safe_owner, ts, suffix
        )
    }

    /// §4.E.1 Create.
    pub async fn create(
        &self,
        owner: &str,
        client_addr: &str,
        captcha_id: Option<&str>,
        captcha_answer: Option<&str>,
    ) -> Result<DeployOutcome, LeaseError> {
        self.admission
            .admit(AdmitRequest {
                owner,
                client_addr,
                captcha_id,
                captcha_answer,
            })
            .await?;

        let name = self.container_name(owner);
        let mut blocked: HashSet<u16> = HashSet::new();

        let mut attempt = 0u32;
        let (port, handle) = loop {
            attempt += 1;
            let Some(port) = self.ports.allocate(&name, &blocked).await? else {
                return Err(LeaseError::NoPorts);
            };

            let spec = ContainerSpec {
                image: self.config.image.clone(),
                name: name.clone(),
                host_port: port,
                container_port: self.config.port_in_container,
                env: vec![("FLAG".to_string(), self.config.flag.clone())],
                network_name: self.config.network_name.clone(),
                memory_limit_bytes: self.config.memory_limit_bytes,
                memory_swap_limit_bytes: self.config.memory_swap_limit_bytes,
                cpu_period: self.config.cpu_period,
                cpu_quota: self.config.cpu_quota,
                pids_limit: self.config.pids_limit,
                read_only_rootfs: self.config.read_only_rootfs,
                no_new_privileges: self.config.no_new_privileges,
                cap_drop: self.config.cap_drop.clone(),
                cap_add: self.config.cap_add.clone(),
                tmpfs: self.config.tmpfs.clone(),
                hostname: name.clone(),
            };

            match self.runtime.create_and_start(&spec).await {
                Ok(handle) => break (port, handle),
                Err(LeaseError::RuntimeError { cause }) if is_address_in_use(&cause) => {
                    self.ports.release(port).await?;
                    blocked.insert(port);
                    if attempt >= self.config.port_allocation_max_attempts {
                        return Err(LeaseError::NoPorts);
                    }
                    continue;
                }
                Err(other) => {
                    self.ports.release(port).await?;
                    return Err(other);
                }
            }
        };

        if let Err(err) = self.ports.set_holder(port, &handle.id).await {
            // The orphan sweep's join key must point at the real runtime
            // handle id, never the provisional name `allocate` was called
            // with; if we can't repoint it, don't leave a lease running
            // behind a slot the sweep can never recognize as held.
            let _ = self.runtime.remove(&handle.id).await;
            let _ = self.ports.release(port).await;
            return Err(err);
        }

        self.admission.record_attempt(client_addr).await?;

        let now = Utc::now();
        let lease = Lease {
            id: handle.id.clone(),
            port: port as i32,
            owner: owner.to_string(),
            client_addr: client_addr.to_string(),
            started_at: now,
            expires_at: now + self.config.leave_time,
        };

        if let Err(err) = self.store.insert_lease(&lease).await {
            // Failure-atomicity: the window between create_and_start and
            // insert_lease is the only place a handle can exist without a
            // lease row. Clean up synchronously; the sweep is a backstop,
            // not a substitute.
            let _ = self.runtime.remove(&handle.id).await;
            let _ = self.ports.release(port).await;
            return Err(err);
        }

        counter!("lease_created_total", 1);
        Ok(DeployOutcome { lease })
    }

    /// §4.E.2 Extend. Relative to the existing expiry, not to now.
    pub async fn extend(&self, owner: &str) -> Result<ExtendOutcome, LeaseError> {
        self.admission.authorize_owner(owner).await?;
        let lease = self
            .store
            .get_lease_by_owner(owner)
            .await?
            .ok_or(LeaseError::NotFound)?;
        let new_expiration = lease.expires_at + self.config.add_time;
        self.store.update_expires_at(&lease.id, new_expiration).await?;
        Ok(ExtendOutcome { new_expiration })
    }

    /// §4.E.3 Stop: lookup then destruction sequence.
    pub async fn stop(&self, owner: &str) -> Result<(), LeaseError> {
        self.admission.authorize_owner(owner).await?;
        let lease = self
            .store
            .get_lease_by_owner(owner)
            .await?
            .ok_or(LeaseError::NotFound)?;
        self.destroy(&lease).await
    }

    /// §4.E.3 Restart: runtime restart only, lease row untouched.
    pub async fn restart(&self, owner: &str) -> Result<(), LeaseError> {
        self.admission.authorize_owner(owner).await?;
        let lease = self
            .store
            .get_lease_by_owner(owner)
            .await?
            .ok_or(LeaseError::NotFound)?;
        self.runtime.restart(&lease.id).await
    }

    pub async fn status_for_owner(&self, owner: &str) -> Result<Option<Lease>, LeaseError> {
        self.store.get_lease_by_owner(owner).await
    }

    /// Destruction sequence: remove -> release -> delete. Each step
    /// proceeds even if the previous one failed; idempotent under
    /// concurrent callers racing the sweeper.
    async fn destroy(&self, lease: &Lease) -> Result<(), LeaseError> {
        if let Err(err) = self.runtime.remove(&lease.id).await {
            tracing::warn!(lease_id = %lease.id, error = %err, "runtime removal failed during destroy");
        }
        if let Err(err) = self.ports.release(lease.port as u16).await {
            tracing::warn!(lease_id = %lease.id, error = %err, "port release failed during destroy");
        }
        self.store.delete_lease(&lease.id).await
    }

    /// §4.E.4 Expiration sweep. One pass: scan, batch, destroy, then
    /// release stale port slots. Never called per-lease in a background
    /// task; this is the single batched sweeper.
    pub async fn sweep_once(&self) -> Result<u32, LeaseError> {
        let now = Utc::now();
        let expired = self.store.scan_expired(now).await?;
        let mut reclaimed = 0u32;

        for batch in expired.chunks(self.config.maintenance_batch_size) {
            for lease in batch {
                match self.destroy(lease).await {
                    Ok(()) => {
                        reclaimed += 1;
                        counter!("lease_expired_reclaimed_total", 1);
                    }
                    Err(err) => {
                        tracing::warn!(lease_id = %lease.id, error = %err, "sweep failed to reclaim lease, will retry next pass");
                    }
                }
            }
            if batch.len() == self.config.maintenance_batch_size {
                sleep(StdDuration::from_millis(50)).await;
            }
        }

        let released = self
            .ports
            .sweep_stale(self.config.stale_port_max_age)
            .await?;
        tracing::debug!(reclaimed, released, "expiration sweep completed");
        Ok(reclaimed)
    }

    /// §4.E.5 Graceful shutdown: destroy every lease in the store within
    /// the configured deadline.
    pub async fn shutdown(&self) -> Result<(), LeaseError> {
        let deadline = tokio::time::Instant::now()
            + self
                .config
                .shutdown_deadline
                .to_std()
                .unwrap_or(StdDuration::from_secs(30));

        let all = self.store.scan_all().await?;
        for lease in all {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(lease_id = %lease.id, "shutdown deadline exceeded, leaving lease for a future sweep");
                continue;
            }
            if let Err(err) = self.destroy(&lease).await {
                tracing::warn!(lease_id = %lease.id, error = %err, "failed to reclaim lease during shutdown");
            }
        }
        Ok(())
    }
}

fn is_address_in_use(cause: &str) -> bool {
    let lowered = cause.to_ascii_lowercase();
    lowered.contains("address already in use") || lowered.contains("port is already allocated")
}

fn random_suffix(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_address_in_use_variants() {
        assert!(is_address_in_use("Error: address already in use"));
        assert!(is_address_in_use("Bind for 0.0.0.0:9000 failed: port is already allocated"));
        assert!(!is_address_in_use("image not found"));
    }

    #[test]
    fn suffix_has_requested_length() {
        assert_eq!(random_suffix(4).len(), 4);
    }
}
