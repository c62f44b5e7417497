use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::LeaseError;
use crate::models::AdmissionSnapshot;
use crate::traits::{LeaseStore, RuntimeAdapter};

/// Single background sampler. Each tick counts active leases, sums
/// per-handle CPU/memory, optionally reconciles against a whole-host
/// sample, and atomically publishes the snapshot the Admission Controller
/// reads.
pub struct ResourceMonitor {
    store: Arc<dyn LeaseStore>,
    runtime: Arc<dyn RuntimeAdapter>,
    snapshot: Arc<RwLock<Option<AdmissionSnapshot>>>,
    name_prefix: String,
    max_total_containers: u32,
    max_total_cpu_percent: u32,
    max_total_memory_gb: f64,
    resource_soft_limit_percent: u32,
}

impl ResourceMonitor {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        runtime: Arc<dyn RuntimeAdapter>,
        snapshot: Arc<RwLock<Option<AdmissionSnapshot>>>,
        name_prefix: String,
        max_total_containers: u32,
        max_total_cpu_percent: u32,
        max_total_memory_gb: f64,
        resource_soft_limit_percent: u32,
    ) -> Self {
        Self {
            store,
            runtime,
            snapshot,
            name_prefix,
            max_total_containers,
            max_total_cpu_percent,
            max_total_memory_gb,
            resource_soft_limit_percent,
        }
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<Option<AdmissionSnapshot>>> {
        self.snapshot.clone()
    }

    /// One sampling tick. `host_sample` is an optional whole-host
    /// (cpu_percent, memory_gb) reading; when it exceeds the summed
    /// per-handle sample by more than 50%, it is preferred, accounting for
    /// runtime-daemon overhead the per-container view misses.
    pub async fn tick(&self, host_sample: Option<(f64, f64)>) -> Result<(), LeaseError> {
        let count = self.store.count_leases().await?;

        let handles = self.runtime.list_by_name_prefix(&self.name_prefix).await?;
        let mut summed_cpu = 0.0;
        let mut summed_memory_bytes: u64 = 0;
        for handle in &handles {
            if let Ok(stats) = self.runtime.stats(&handle.id).await {
                summed_cpu += stats.cpu_percent;
                summed_memory_bytes += stats.memory_bytes;
            }
        }
        let mut cpu_percent = summed_cpu;
        let mut memory_gb = summed_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);

        if let Some((host_cpu, host_memory_gb)) = host_sample {
            if exceeds_by_half(host_cpu, cpu_percent) {
                cpu_percent = host_cpu;
            }
            if exceeds_by_half(host_memory_gb, memory_gb) {
                memory_gb = host_memory_gb;
            }
        }

        let snapshot = AdmissionSnapshot {
            lease_count: count,
            cpu_percent,
            memory_gb,
            max_containers: self.max_total_containers,
            max_cpu_percent: self.max_total_cpu_percent,
            max_memory_gb: self.max_total_memory_gb,
            sampled_at: Utc::now(),
        };

        self.warn_if_over_soft_limit("containers", count as f64, self.max_total_containers as f64);
        self.warn_if_over_soft_limit("cpu", cpu_percent, self.max_total_cpu_percent as f64);
        self.warn_if_over_soft_limit("memory", memory_gb, self.max_total_memory_gb);

        *self.snapshot.write().await = Some(snapshot);
        Ok(())
    }

    fn warn_if_over_soft_limit(&self, dimension: &str, current: f64, limit: f64) {
        if limit <= 0.0 {
            return;
        }
        let percent = (current / limit) * 100.0;
        if percent > self.resource_soft_limit_percent as f64 {
            tracing::warn!(dimension, percent, "resource usage over soft limit");
        }
    }
}

fn exceeds_by_half(host: f64, summed: f64) -> bool {
    if summed <= 0.0 {
        return host > 0.0;
    }
    host > summed * 1.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_sample_preferred_when_much_higher() {
        assert!(exceeds_by_half(10.0, 5.0));
        assert!(!exceeds_by_half(6.0, 5.0));
        assert!(exceeds_by_half(1.0, 0.0));
    }
}
