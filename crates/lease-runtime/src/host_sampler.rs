//! Whole-host CPU/memory sampling for §4.F step 3's host-vs-container
//! reconciliation, grounded on `original_source/flask_app/resource_monitor.py`'s
//! `psutil`-based fallback (`psutil.cpu_percent() * psutil.cpu_count()`,
//! `psutil.virtual_memory().used`). `sysinfo` is this workspace's existing
//! system-introspection crate (already used by `port_lease` for PID
//! liveness checks), so it is reused here rather than adding a new one.

use sysinfo::System;

/// Holds a live `System` handle across ticks so CPU deltas are meaningful
/// (the first call after construction reports 0% per `sysinfo`'s own
/// convention, since there is no prior sample to diff against).
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self { system }
    }

    /// Sums per-core CPU usage (percent-of-one-core each) and reads used
    /// memory in GB, mirroring the Python original's
    /// `cpu_percent(interval=None) * cpu_count()` and
    /// `virtual_memory().used / 1024**3`.
    pub fn sample(&mut self) -> (f64, f64) {
        self.system.refresh_all();

        let cpu_percent: f64 = self
            .system
            .cpus()
            .iter()
            .map(|cpu| cpu.cpu_usage() as f64)
            .sum();
        let memory_gb = self.system.used_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        (cpu_percent, memory_gb)
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_returns_non_negative_readings() {
        let mut sampler = HostSampler::new();
        let (cpu, mem) = sampler.sample();
        assert!(cpu >= 0.0);
        assert!(mem >= 0.0);
    }
}
