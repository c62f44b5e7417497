//! Structured logging and metrics instrumentation, ambient concerns carried
//! regardless of the spec's Non-goals around the outer observability
//! surface (`spec.md` §1 excludes metrics export as a *feature*; the
//! underlying instrumentation is still built the way this workspace builds
//! it).

pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber: an env-filter (defaulting to
/// `default_directive` when `RUST_LOG` is unset) plus a structured JSON fmt
/// layer. Call once at process startup, before any other component logs.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(())
}
