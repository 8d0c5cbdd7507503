//! Signal handling for graceful shutdown.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Install SIGTERM and SIGINT handlers and spawn a task that flips
/// `shutdown_tx` to `true` when either arrives.
///
/// Failing to install a handler is a setup error.
pub fn spawn_shutdown_handler(shutdown_tx: watch::Sender<bool>) -> std::io::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
        shutdown_tx.send_replace(true);
    }))
}
