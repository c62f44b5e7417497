//! End-to-end scenarios for the lease lifecycle, run against
//! `LeaseManager` wired to in-memory fakes instead of MySQL/Docker so they
//! exercise the real admission → allocate → create → persist pipeline
//! without external services.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lease_core::{
    AdmissionController, AdmissionSnapshot, InMemoryCaptchaProvider, Lease, LeaseError,
    LeaseManager, LeaseStore, ManagerConfig, PortRegistry, ResourceMonitor, RuntimeAdapter,
};
use lease_runtime::FakeRuntimeAdapter;
use tokio::sync::{Mutex, RwLock};

/// In-memory `LeaseStore`: a `containers` table and an `ip_requests` table,
/// both guarded by a single mutex. Good enough for exercising the
/// invariants in isolation; the real persistence is `lease-store`'s job.
#[derive(Default)]
struct MemoryLeaseStore {
    leases: Mutex<HashMap<String, Lease>>,
    rate_events: Mutex<Vec<(String, DateTime<Utc>)>>,
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn insert_lease(&self, lease: &Lease) -> Result<(), LeaseError> {
        self.leases.lock().await.insert(lease.id.clone(), lease.clone());
        Ok(())
    }

    async fn get_lease_by_owner(&self, owner: &str) -> Result<Option<Lease>, LeaseError> {
        Ok(self.leases.lock().await.values().find(|l| l.owner == owner).cloned())
    }

    async fn get_lease_by_id(&self, id: &str) -> Result<Option<Lease>, LeaseError> {
        Ok(self.leases.lock().await.get(id).cloned())
    }

    async fn update_expires_at(&self, id: &str, new_ts: DateTime<Utc>) -> Result<(), LeaseError> {
        if let Some(lease) = self.leases.lock().await.get_mut(id) {
            lease.expires_at = new_ts;
        }
        Ok(())
    }

    async fn delete_lease(&self, id: &str) -> Result<(), LeaseError> {
        self.leases.lock().await.remove(id);
        Ok(())
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Lease>, LeaseError> {
        let mut expired: Vec<Lease> = self
            .leases
            .lock()
            .await
            .values()
            .filter(|l| l.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.expires_at);
        Ok(expired)
    }

    async fn scan_all(&self) -> Result<Vec<Lease>, LeaseError> {
        Ok(self.leases.lock().await.values().cloned().collect())
    }

    async fn count_leases(&self) -> Result<u32, LeaseError> {
        Ok(self.leases.lock().await.len() as u32)
    }

    async fn count_leases_by_client(&self, client_addr: &str) -> Result<u32, LeaseError> {
        Ok(self
            .leases
            .lock()
            .await
            .values()
            .filter(|l| l.client_addr == client_addr)
            .count() as u32)
    }

    async fn record_rate_event(&self, client_addr: &str, ts: DateTime<Utc>) -> Result<(), LeaseError> {
        self.rate_events.lock().await.push((client_addr.to_string(), ts));
        Ok(())
    }

    async fn count_rate_events(&self, client_addr: &str, since: DateTime<Utc>) -> Result<u32, LeaseError> {
        Ok(self
            .rate_events
            .lock()
            .await
            .iter()
            .filter(|(addr, ts)| addr == client_addr && *ts > since)
            .count() as u32)
    }

    async fn prune_rate_events(&self, before: DateTime<Utc>) -> Result<(), LeaseError> {
        self.rate_events.lock().await.retain(|(_, ts)| *ts >= before);
        Ok(())
    }
}

struct PortSlot {
    port: u16,
    holder: Option<String>,
    allocated_time: Option<DateTime<Utc>>,
}

/// In-memory `PortRegistry`: a free-list guarded by a mutex, mirroring the
/// `FOR UPDATE SKIP LOCKED` semantics closely enough for single-process
/// tests (no real concurrent contention to skip past). Mirrors the SQL
/// registry's `containers` cross-check too: a slot is a sweepable orphan
/// only if its holder id has no matching row in the lease store, not
/// merely because it is old.
struct MemoryPortRegistry {
    slots: Mutex<Vec<PortSlot>>,
    store: Arc<MemoryLeaseStore>,
}

impl MemoryPortRegistry {
    fn new(range: std::ops::Range<u16>, store: Arc<MemoryLeaseStore>) -> Self {
        Self {
            slots: Mutex::new(
                range
                    .map(|port| PortSlot {
                        port,
                        holder: None,
                        allocated_time: None,
                    })
                    .collect(),
            ),
            store,
        }
    }

    /// Test-only hook to simulate a slot reserved long ago, since real time
    /// can't be advanced here.
    async fn backdate(&self, port: u16, age: chrono::Duration) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.iter_mut().find(|s| s.port == port) {
            slot.allocated_time = Some(Utc::now() - age);
        }
    }
}

#[async_trait]
impl PortRegistry for MemoryPortRegistry {
    async fn allocate(&self, holder_id: &str, blocked: &HashSet<u16>) -> Result<Option<u16>, LeaseError> {
        let mut slots = self.slots.lock().await;
        for slot in slots.iter_mut() {
            if slot.holder.is_none() && !blocked.contains(&slot.port) {
                slot.holder = Some(holder_id.to_string());
                slot.allocated_time = Some(Utc::now());
                return Ok(Some(slot.port));
            }
        }
        Ok(None)
    }

    async fn set_holder(&self, port: u16, holder_id: &str) -> Result<(), LeaseError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.iter_mut().find(|s| s.port == port) {
            slot.holder = Some(holder_id.to_string());
        }
        Ok(())
    }

    async fn release(&self, port: u16) -> Result<(), LeaseError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.iter_mut().find(|s| s.port == port) {
            slot.holder = None;
            slot.allocated_time = None;
        }
        Ok(())
    }

    async fn is_allocated(&self, port: u16) -> Result<bool, LeaseError> {
        Ok(self
            .slots
            .lock()
            .await
            .iter()
            .any(|slot| slot.port == port && slot.holder.is_some()))
    }

    async fn sweep_stale(&self, max_age: chrono::Duration) -> Result<u32, LeaseError> {
        let cutoff = Utc::now() - max_age;
        let candidates: Vec<(u16, String)> = self
            .slots
            .lock()
            .await
            .iter()
            .filter_map(|slot| {
                let holder = slot.holder.as_ref()?;
                let allocated_time = slot.allocated_time?;
                (allocated_time < cutoff).then(|| (slot.port, holder.clone()))
            })
            .collect();

        let mut released = 0u32;
        for (port, holder) in candidates {
            if self.store.get_lease_by_id(&holder).await?.is_none() {
                self.release(port).await?;
                released += 1;
            }
        }
        Ok(released)
    }
}

fn test_manager_config(leave_time_secs: i64) -> ManagerConfig {
    ManagerConfig {
        compose_project_name: "testproj".to_string(),
        image: "challenge:latest".to_string(),
        flag: "FLAG{test}".to_string(),
        port_in_container: 80,
        network_name: "testnet".to_string(),
        leave_time: chrono::Duration::seconds(leave_time_secs),
        add_time: chrono::Duration::seconds(600),
        port_allocation_max_attempts: 5,
        memory_limit_bytes: 256 * 1024 * 1024,
        memory_swap_limit_bytes: 256 * 1024 * 1024,
        cpu_period: 100_000,
        cpu_quota: 100_000,
        pids_limit: 64,
        read_only_rootfs: true,
        no_new_privileges: true,
        cap_drop: vec!["ALL".to_string()],
        cap_add: vec![],
        tmpfs: None,
        maintenance_batch_size: 10,
        stale_port_max_age: chrono::Duration::seconds(600),
        shutdown_deadline: chrono::Duration::seconds(30),
    }
}

struct Harness {
    manager: LeaseManager,
    store: Arc<MemoryLeaseStore>,
    ports: Arc<MemoryPortRegistry>,
    runtime: Arc<FakeRuntimeAdapter>,
}

fn build_harness(port_range: std::ops::Range<u16>, leave_time_secs: i64, max_per_hour: u32) -> Harness {
    let store = Arc::new(MemoryLeaseStore::default());
    let ports = Arc::new(MemoryPortRegistry::new(port_range, store.clone()));
    let runtime = Arc::new(FakeRuntimeAdapter::new());
    let captcha = Arc::new(InMemoryCaptchaProvider::new(chrono::Duration::seconds(300)));
    let snapshot: Arc<RwLock<Option<AdmissionSnapshot>>> = Arc::new(RwLock::new(None));
    let monitor = Arc::new(ResourceMonitor::new(
        store.clone(),
        runtime.clone(),
        snapshot.clone(),
        "testproj".to_string(),
        1000,
        1000,
        1000.0,
        90,
    ));

    let admission = Arc::new(AdmissionController::new(
        store.clone(),
        captcha,
        snapshot,
        monitor,
        true, // bypass captcha for these tests
        false,
        max_per_hour,
        chrono::Duration::seconds(3600),
        chrono::Duration::seconds(30),
    ));

    let manager = LeaseManager::new(
        ports.clone(),
        store.clone(),
        runtime.clone(),
        admission,
        test_manager_config(leave_time_secs),
    );

    Harness { manager, store, ports, runtime }
}

#[tokio::test]
async fn happy_path_then_duplicate_then_exhaustion() {
    let h = build_harness(9000..9002, 10, 100);

    let first = h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();
    assert_eq!(first.lease.port, 9000);
    assert!(h.ports.is_allocated(9000).await.unwrap());

    // Scenario 2: duplicate owner.
    let dup = h.manager.create("owner-a", "203.0.113.1", None, None).await;
    assert!(matches!(dup, Err(LeaseError::DuplicateLease)));
    assert_eq!(h.store.count_leases().await.unwrap(), 1);

    let second = h.manager.create("owner-b", "203.0.113.2", None, None).await.unwrap();
    assert_eq!(second.lease.port, 9001);

    // Scenario 3: exhaustion.
    let third = h.manager.create("owner-c", "203.0.113.3", None, None).await;
    assert!(matches!(third, Err(LeaseError::NoPorts)));
}

#[tokio::test]
async fn expiration_sweep_reclaims_and_frees_port() {
    let h = build_harness(9000..9001, -1, 100); // already expired on creation

    let outcome = h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();
    assert!(h.ports.is_allocated(9000).await.unwrap());

    let reclaimed = h.manager.sweep_once().await.unwrap();
    assert_eq!(reclaimed, 1);
    assert!(h.store.get_lease_by_id(&outcome.lease.id).await.unwrap().is_none());
    assert!(!h.ports.is_allocated(9000).await.unwrap());
    assert!(matches!(h.runtime.status(&outcome.lease.id).await.unwrap().state, lease_core::HandleState::NotFound));
}

#[tokio::test]
async fn external_port_conflict_retries_next_port() {
    let h = build_harness(9000..9002, 10, 100);
    h.runtime.reject_port(9000);

    let outcome = h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();
    assert_eq!(outcome.lease.port, 9001);
    assert!(!h.ports.is_allocated(9000).await.unwrap());
    assert!(h.ports.is_allocated(9001).await.unwrap());
}

#[tokio::test]
async fn extend_is_relative_to_existing_expiry_not_now() {
    let h = build_harness(9000..9001, 10, 100);
    let outcome = h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();
    let original_expiry = outcome.lease.expires_at;

    let extended = h.manager.extend("owner-a").await.unwrap();
    assert_eq!(extended.new_expiration, original_expiry + chrono::Duration::seconds(600));
}

#[tokio::test]
async fn stop_then_stop_again_is_idempotent() {
    let h = build_harness(9000..9001, 10, 100);
    h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();

    h.manager.stop("owner-a").await.unwrap();
    assert_eq!(h.store.count_leases().await.unwrap(), 0);
    assert!(!h.ports.is_allocated(9000).await.unwrap());

    // Second stop for the same owner now finds no lease: NotFound, not a panic.
    let second = h.manager.stop("owner-a").await;
    assert!(matches!(second, Err(LeaseError::NotFound)));
}

#[tokio::test]
async fn shutdown_reclaims_every_active_lease() {
    let h = build_harness(9000..9002, 10, 100);
    h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();
    h.manager.create("owner-b", "203.0.113.2", None, None).await.unwrap();
    assert_eq!(h.store.count_leases().await.unwrap(), 2);

    h.manager.shutdown().await.unwrap();

    assert_eq!(h.store.count_leases().await.unwrap(), 0);
    assert!(!h.ports.is_allocated(9000).await.unwrap());
    assert!(!h.ports.is_allocated(9001).await.unwrap());
}

#[tokio::test]
async fn stale_port_sweep_spares_active_leases_and_reclaims_true_orphans() {
    let h = build_harness(9000..9002, 3600, 100);
    let outcome = h.manager.create("owner-a", "203.0.113.1", None, None).await.unwrap();

    // Backdate the slot so it looks old enough to sweep, but the lease is
    // still present in the store under the id the port's holder was set
    // to (the real runtime handle id, via `set_holder`) — the sweep must
    // recognize the match and leave it alone.
    h.ports.backdate(outcome.lease.port as u16, chrono::Duration::seconds(700)).await;
    let released = h.ports.sweep_stale(chrono::Duration::seconds(600)).await.unwrap();
    assert_eq!(released, 0);
    assert!(h.ports.is_allocated(outcome.lease.port as u16).await.unwrap());

    // Simulate a true orphan: the lease row is gone (e.g. a crash before
    // destroy released the port) but the slot is still marked allocated.
    h.store.delete_lease(&outcome.lease.id).await.unwrap();
    let released = h.ports.sweep_stale(chrono::Duration::seconds(600)).await.unwrap();
    assert_eq!(released, 1);
    assert!(!h.ports.is_allocated(outcome.lease.port as u16).await.unwrap());
}

#[tokio::test]
async fn resource_quota_triggers_on_demand_refresh_instead_of_admitting_unchecked() {
    let store = Arc::new(MemoryLeaseStore::default());
    let ports = Arc::new(MemoryPortRegistry::new(9000..9001, store.clone()));
    let runtime = Arc::new(FakeRuntimeAdapter::new());
    let captcha = Arc::new(InMemoryCaptchaProvider::new(chrono::Duration::seconds(300)));
    let snapshot: Arc<RwLock<Option<AdmissionSnapshot>>> = Arc::new(RwLock::new(None));
    // A monitor wired to a runtime that never returns handles still
    // produces a fresh (non-stale) snapshot on tick, so the on-demand
    // refresh this test exercises actually resolves the staleness.
    let monitor = Arc::new(ResourceMonitor::new(
        store.clone(),
        runtime.clone(),
        snapshot.clone(),
        "testproj".to_string(),
        10,
        1000,
        1000.0,
        90,
    ));

    let admission = Arc::new(AdmissionController::new(
        store.clone(),
        captcha,
        snapshot.clone(),
        monitor,
        true,
        true, // resource quotas enabled
        100,
        chrono::Duration::seconds(3600),
        chrono::Duration::seconds(30),
    ));

    let manager = LeaseManager::new(
        ports,
        store,
        runtime,
        admission,
        test_manager_config(10),
    );

    // No snapshot has ever been published: admission must not fall
    // through unchecked, it must refresh on demand and then evaluate the
    // quota against the refreshed reading.
    assert!(snapshot.read().await.is_none());
    let outcome = manager.create("owner-a", "203.0.113.1", None, None).await;
    assert!(outcome.is_ok(), "on-demand refresh should have produced a fresh, within-quota snapshot");
    assert!(snapshot.read().await.is_some());
}
