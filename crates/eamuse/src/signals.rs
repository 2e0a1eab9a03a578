//! Signal handling for graceful server shutdown.
//!
//! Cabinets retry anything that fails mid-flight, so shutting down only has
//! to stop accepting connections and let in-flight requests finish.

use tokio::signal;
use tracing::{error, info};

/// Waits for a termination signal.
///
/// Listens for SIGINT and SIGTERM on Unix and Ctrl+C on Windows, returning
/// when the first one arrives.
///
/// # Returns
///
/// `Ok(())` when a shutdown signal is received, or an error if signal
/// handling setup failed.
pub async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

/// Shutdown future for `axum::serve(..).with_graceful_shutdown`.
///
/// If the handlers cannot be installed the server keeps running until the
/// process is killed.
pub async fn shutdown_signal() {
    if let Err(e) = wait_for_shutdown().await {
        error!("❌ Failed to install signal handlers: {}", e);
        std::future::pending::<()>().await;
    }
}
