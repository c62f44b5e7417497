//! Domain types and orchestration logic for the sandbox lease manager.
//!
//! Pure business logic, independent of HTTP, the container runtime, and
//! how configuration is sourced. Collaborators are injected as trait
//! objects so this crate never talks to MySQL or Docker directly.

pub mod admission;
pub mod captcha;
pub mod error;
pub mod manager;
pub mod models;
pub mod resource_monitor;
pub mod traits;

pub use admission::{AdmissionController, AdmitRequest};
pub use captcha::InMemoryCaptchaProvider;
pub use error::LeaseError;
pub use manager::{DeployOutcome, ExtendOutcome, LeaseManager, ManagerConfig};
pub use models::{AdmissionSnapshot, Lease, PortSlot, PortState, RateEvent};
pub use resource_monitor::ResourceMonitor;
pub use traits::{
    CaptchaProvider, ContainerSpec, HandleState, HandleStats, HandleStatus, LeaseStore,
    PortRegistry, RuntimeAdapter, RuntimeHandle,
};
