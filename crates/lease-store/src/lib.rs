//! MySQL-backed §4.A Port Registry and §4.B Lease Store, plus the
//! dedicated request/maintenance connection pools §5 requires.

pub mod connection;
pub mod lease_store;
pub mod port_registry;
pub mod retry;

pub use connection::{create_maintenance_pool, create_request_pool, ConnectionSettings};
pub use lease_store::SqlLeaseStore;
pub use port_registry::SqlPortRegistry;
