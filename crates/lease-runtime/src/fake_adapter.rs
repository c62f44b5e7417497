//! In-memory `RuntimeAdapter` test fake. No real containers are created;
//! `create_and_start` assigns a fresh handle id and tracks it in a map, so
//! the rest of the system can be exercised without a Docker daemon.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use lease_core::{
    ContainerSpec, HandleState, HandleStats, HandleStatus, LeaseError, RuntimeAdapter,
    RuntimeHandle,
};

struct FakeContainer {
    name: String,
    running: bool,
}

pub struct FakeRuntimeAdapter {
    containers: DashMap<String, FakeContainer>,
    next_id: AtomicU64,
    /// Host ports that should be reported as already bound, simulating an
    /// external process winning the race for that port.
    pub reject_ports: DashMap<u16, ()>,
}

impl FakeRuntimeAdapter {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            next_id: AtomicU64::new(1),
            reject_ports: DashMap::new(),
        }
    }

    pub fn reject_port(&self, port: u16) {
        self.reject_ports.insert(port, ());
    }

    pub fn is_running(&self, handle_id: &str) -> bool {
        self.containers.get(handle_id).map(|c| c.running).unwrap_or(false)
    }
}

impl Default for FakeRuntimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntimeAdapter {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<RuntimeHandle, LeaseError> {
        if self.reject_ports.contains_key(&spec.host_port) {
            return Err(LeaseError::RuntimeError {
                cause: "Bind for 0.0.0.0:port failed: port is already allocated".to_string(),
            });
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.insert(
            id.clone(),
            FakeContainer { name: spec.name.clone(), running: true },
        );
        Ok(RuntimeHandle { id })
    }

    async fn remove(&self, handle_id: &str) -> Result<(), LeaseError> {
        self.containers.remove(handle_id);
        Ok(())
    }

    async fn status(&self, handle_id: &str) -> Result<HandleStatus, LeaseError> {
        match self.containers.get(handle_id) {
            Some(container) if container.running => {
                Ok(HandleStatus { state: HandleState::Running, running: true })
            }
            Some(_) => Ok(HandleStatus { state: HandleState::Stopped, running: false }),
            None => Ok(HandleStatus::not_found()),
        }
    }

    async fn restart(&self, handle_id: &str) -> Result<(), LeaseError> {
        match self.containers.get_mut(handle_id) {
            Some(mut container) => {
                container.running = true;
                Ok(())
            }
            None => Err(LeaseError::NotFound),
        }
    }

    async fn stats(&self, handle_id: &str) -> Result<HandleStats, LeaseError> {
        if self.containers.contains_key(handle_id) {
            Ok(HandleStats { cpu_percent: 0.0, memory_bytes: 0 })
        } else {
            Err(LeaseError::NotFound)
        }
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<RuntimeHandle>, LeaseError> {
        Ok(self
            .containers
            .iter()
            .filter(|entry| entry.value().name.starts_with(prefix))
            .map(|entry| RuntimeHandle { id: entry.key().clone() })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, port: u16) -> ContainerSpec {
        ContainerSpec {
            image: "chal:latest".to_string(),
            name: name.to_string(),
            host_port: port,
            container_port: 80,
            env: vec![],
            network_name: "chal_net".to_string(),
            memory_limit_bytes: 128 * 1024 * 1024,
            memory_swap_limit_bytes: 128 * 1024 * 1024,
            cpu_period: 100_000,
            cpu_quota: 50_000,
            pids_limit: 64,
            read_only_rootfs: true,
            no_new_privileges: true,
            cap_drop: vec!["ALL".to_string()],
            cap_add: vec![],
            tmpfs: None,
            hostname: name.to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_status_is_running() {
        let adapter = FakeRuntimeAdapter::new();
        let handle = adapter.create_and_start(&spec("proj_session_a_1_abcd", 9000)).await.unwrap();
        let status = adapter.status(&handle.id).await.unwrap();
        assert!(status.running);
    }

    #[tokio::test]
    async fn rejected_port_surfaces_address_in_use() {
        let adapter = FakeRuntimeAdapter::new();
        adapter.reject_port(9000);
        let err = adapter.create_and_start(&spec("proj_session_a_1_abcd", 9000)).await.unwrap_err();
        assert!(matches!(err, LeaseError::RuntimeError { .. }));
    }

    #[tokio::test]
    async fn remove_then_status_not_found() {
        let adapter = FakeRuntimeAdapter::new();
        let handle = adapter.create_and_start(&spec("proj_session_a_1_abcd", 9000)).await.unwrap();
        adapter.remove(&handle.id).await.unwrap();
        let status = adapter.status(&handle.id).await.unwrap();
        assert_eq!(status.state, HandleState::NotFound);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let adapter = FakeRuntimeAdapter::new();
        let handle = adapter.create_and_start(&spec("proj_session_a_1_abcd", 9000)).await.unwrap();
        adapter.remove(&handle.id).await.unwrap();
        // second removal of an already-gone handle must still succeed
        adapter.remove(&handle.id).await.unwrap();
    }

    #[tokio::test]
    async fn list_by_name_prefix_filters() {
        let adapter = FakeRuntimeAdapter::new();
        adapter.create_and_start(&spec("proj_session_a_1_abcd", 9000)).await.unwrap();
        adapter.create_and_start(&spec("other_thing", 9001)).await.unwrap();
        let matches = adapter.list_by_name_prefix("proj_session_").await.unwrap();
        assert_eq!(matches.len(), 1);
    }
}
