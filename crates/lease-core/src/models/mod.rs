mod admission_snapshot;
mod lease;
mod port_slot;
mod rate_event;

pub use admission_snapshot::AdmissionSnapshot;
pub use lease::Lease;
pub use port_slot::{PortSlot, PortState};
pub use rate_event::RateEvent;
