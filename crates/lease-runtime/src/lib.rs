//! §4.C Runtime Adapter plus the platform-level concerns the lease manager
//! needs around its own HTTP listener:
//!
//! - **Runtime Adapter**: [`DockerRuntimeAdapter`] (bollard-backed) and
//!   [`FakeRuntimeAdapter`] (in-memory test fake) implement
//!   `lease_core::RuntimeAdapter` — the narrow "one prod impl, one fake"
//!   interface called for in `spec.md` §9.
//! - **Own-port binding**: production-grade binding for the HTTP listener
//!   itself (distinct from the sandbox port pool the Port Registry owns),
//!   with OS-level socket reuse and multi-process lease coordination.
//! - **Graceful shutdown signal** consumed by the root binary.

pub mod docker_adapter;
pub mod fake_adapter;
pub mod host_sampler;
pub mod port_authority;
pub mod port_lease;
pub mod port_policy;
pub mod safe_socket;
pub mod shutdown;

pub use docker_adapter::DockerRuntimeAdapter;
pub use fake_adapter::FakeRuntimeAdapter;
pub use host_sampler::HostSampler;
pub use port_authority::PortAuthority;
pub use port_lease::PortLease;
pub use port_policy::{PortClass, PortPolicy};
pub use safe_socket::ManagedListener;
pub use shutdown::shutdown_signal;

/// Own-port-binding errors, distinct from `lease_core::LeaseError` which
/// covers the domain-level runtime/store/admission failures.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Port error: {0}")]
    Port(#[from] port_authority::PortError),

    #[error("Policy error: {0}")]
    Policy(#[from] port_policy::PolicyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
