//! Ctrl+C handling for the binaries.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

/// Spawn a task that flips the returned receiver to `true` on Ctrl+C
///
/// Must be called from within a tokio runtime.
pub fn listen_for_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // Keep the sender alive so receivers never see a spurious shutdown
                tx.closed().await;
            }
        }
    });

    rx
}

/// Resolve once shutdown has been requested
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    // wait_for only errors when the sender is gone, which also means shut down
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `true` if the sleep was cut short by a shutdown request.
pub async fn sleep_or_shutdown(rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = requested(rx) => true,
    }
}
