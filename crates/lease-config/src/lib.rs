//! Typed configuration for the sandbox lease manager.
//!
//! Every environment variable named in the external HTTP/deployment
//! contract is a field of [`Settings`], loaded once at startup and passed
//! by reference to the rest of the system.

pub mod error;
pub mod loader;
pub mod settings;

pub use error::ConfigError;
pub use loader::load;
pub use settings::{parse_memory_string, Settings};
