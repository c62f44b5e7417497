//! §4.C Runtime Adapter, backed by the container runtime via `bollard`.
//!
//! The only component in the system that talks to the runtime; it never
//! persists state of its own. `create_and_start` creates then starts in two
//! steps, removing the partial container if start fails so a half-created
//! handle never leaks back to the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    RestartContainerOptions, StatsOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use lease_core::{
    ContainerSpec, HandleState, HandleStats, HandleStatus, LeaseError, RuntimeAdapter,
    RuntimeHandle,
};

pub struct DockerRuntimeAdapter {
    docker: Docker,
}

impl DockerRuntimeAdapter {
    /// Connects using the environment-default Docker socket (`DOCKER_HOST`,
    /// or the platform default unix/npipe socket when unset).
    pub fn connect() -> Result<Self, LeaseError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|err| LeaseError::RuntimeError { cause: err.to_string() })?;
        Ok(Self { docker })
    }

    fn host_config(spec: &ContainerSpec) -> HostConfig {
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            format!("{}/tcp", spec.container_port),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut security_opt = Vec::new();
        if spec.no_new_privileges {
            security_opt.push("no-new-privileges:true".to_string());
        }

        let tmpfs = spec.tmpfs.as_ref().map(|(path, opts)| {
            let mut map = HashMap::new();
            map.insert(path.clone(), opts.clone());
            map
        });

        HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: Some(spec.network_name.clone()),
            memory: Some(spec.memory_limit_bytes as i64),
            memory_swap: Some(spec.memory_swap_limit_bytes as i64),
            cpu_period: Some(spec.cpu_period),
            cpu_quota: Some(spec.cpu_quota),
            pids_limit: Some(spec.pids_limit),
            readonly_rootfs: Some(spec.read_only_rootfs),
            security_opt: if security_opt.is_empty() { None } else { Some(security_opt) },
            cap_add: if spec.cap_add.is_empty() { None } else { Some(spec.cap_add.clone()) },
            cap_drop: if spec.cap_drop.is_empty() { None } else { Some(spec.cap_drop.clone()) },
            tmpfs,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RuntimeAdapter for DockerRuntimeAdapter {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<RuntimeHandle, LeaseError> {
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{}/tcp", spec.container_port), HashMap::new());

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_create_error)?;

        if let Err(err) = self.docker.start_container::<String>(&created.id, None).await {
            // Start failed: remove the partial handle before surfacing the
            // error so no orphaned handle outlives this call.
            let _ = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions { force: true, ..Default::default() }),
                )
                .await;
            return Err(map_start_error(err));
        }

        Ok(RuntimeHandle { id: created.id })
    }

    async fn remove(&self, handle_id: &str) -> Result<(), LeaseError> {
        match self
            .docker
            .remove_container(
                handle_id,
                Some(RemoveContainerOptions { force: true, ..Default::default() }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(LeaseError::RuntimeError { cause: err.to_string() }),
        }
    }

    async fn status(&self, handle_id: &str) -> Result<HandleStatus, LeaseError> {
        match self.docker.inspect_container(handle_id, None).await {
            Ok(inspect) => {
                let running = inspect
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                let state = if running { HandleState::Running } else { HandleState::Stopped };
                Ok(HandleStatus { state, running })
            }
            Err(err) if is_not_found(&err) => Ok(HandleStatus::not_found()),
            Err(err) => Err(LeaseError::RuntimeError { cause: err.to_string() }),
        }
    }

    async fn restart(&self, handle_id: &str) -> Result<(), LeaseError> {
        self.docker
            .restart_container(handle_id, None::<RestartContainerOptions>)
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    LeaseError::NotFound
                } else {
                    LeaseError::RuntimeError { cause: err.to_string() }
                }
            })
    }

    async fn stats(&self, handle_id: &str) -> Result<HandleStats, LeaseError> {
        let mut stream = self.docker.stats(
            handle_id,
            Some(StatsOptions { stream: false, one_shot: true }),
        );

        let Some(sample) = stream.next().await else {
            return Err(LeaseError::NotFound);
        };
        let sample = sample.map_err(|err| LeaseError::RuntimeError { cause: err.to_string() })?;

        let cpu = &sample.cpu_stats;
        let precpu = &sample.precpu_stats;
        let online_cpus = cpu.online_cpus.unwrap_or_else(|| {
            cpu.cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u64)
                .unwrap_or(1)
        });
        let cpu_percent = cpu_percent_from_deltas(
            cpu.cpu_usage.total_usage,
            precpu.cpu_usage.total_usage,
            cpu.system_cpu_usage.unwrap_or(0),
            precpu.system_cpu_usage.unwrap_or(0),
            online_cpus,
        );
        let memory_bytes = sample.memory_stats.usage.unwrap_or(0);

        Ok(HandleStats { cpu_percent, memory_bytes })
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<RuntimeHandle>, LeaseError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![prefix.to_string()]);

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|err| LeaseError::RuntimeError { cause: err.to_string() })?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| summary.id.map(|id| RuntimeHandle { id }))
            .collect())
    }
}

/// CPU% from two cumulative readings, the same formula the Docker CLI uses:
/// delta(container usage) / delta(system usage) * online CPUs * 100.
fn cpu_percent_from_deltas(
    total_usage: u64,
    pretotal_usage: u64,
    system_usage: u64,
    presystem_usage: u64,
    online_cpus: u64,
) -> f64 {
    let cpu_delta = total_usage as i64 - pretotal_usage as i64;
    let system_delta = system_usage as i64 - presystem_usage as i64;

    if cpu_delta <= 0 || system_delta <= 0 {
        return 0.0;
    }

    (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404
    )
}

fn map_create_error(err: bollard::errors::Error) -> LeaseError {
    LeaseError::RuntimeError { cause: err.to_string() }
}

fn map_start_error(err: bollard::errors::Error) -> LeaseError {
    // "address already in use" / "port is already allocated" surfaces here
    // verbatim so `LeaseManager::create` can distinguish it and retry with a
    // different port rather than failing the whole request.
    LeaseError::RuntimeError { cause: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delta_yields_zero_percent() {
        assert_eq!(cpu_percent_from_deltas(100, 100, 1000, 900, 2), 0.0);
    }

    #[test]
    fn full_core_saturation_is_one_hundred_percent_per_cpu() {
        // container used all of a 1000-unit system-usage delta on one CPU
        assert_eq!(cpu_percent_from_deltas(1100, 100, 2000, 1000, 1), 100.0);
    }

    #[test]
    fn online_cpus_scale_the_percentage() {
        assert_eq!(cpu_percent_from_deltas(600, 100, 2000, 1000, 4), 200.0);
    }
}
