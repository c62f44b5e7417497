//! Shutdown signal used by the root binary to trigger §4.E.5 graceful
//! shutdown: listens for SIGTERM/SIGINT and returns, letting `main` drive
//! `LeaseManager::shutdown` within its own deadline rather than tearing
//! the process down here.

use tokio::signal;
use tracing::info;

/// Resolves once SIGTERM or SIGINT (Ctrl+C) is received.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("received SIGINT (Ctrl+C)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C");
    }
}
