//! Prometheus metrics recorder installation and rendering.
//!
//! `spec.md` §6 names `GET /metrics` as an interface the core exposes to but
//! the exporter itself is out of scope for the core; this module installs
//! the recorder `lease-core`'s counters/gauges publish through, so
//! `lease-api` has something real to render behind the admin gate.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder and returns a handle whose
/// `render()` produces the text-exposition body for `GET /metrics`.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(handle)
}
