//! Process-wide shutdown signal.
//!
//! A `watch<bool>` that flips to `true` once. Every long wait in the pipeline
//! races [`signalled`] so that it unblocks as soon as shutdown begins.

use tokio::sync::watch;
use tracing::{error, info};

pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once shutdown has been requested.
///
/// A dropped sender counts as a request: nothing could signal afterwards.
pub async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub fn is_signalled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Flip `tx` on Ctrl-C or SIGTERM.
pub fn spawn_signal_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_os_signal().await;
        info!("Shutdown signal received");
        let _ = tx.send(true);
    });
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl+c");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for ctrl+c");
            }
        }
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl+c");
    }
}
