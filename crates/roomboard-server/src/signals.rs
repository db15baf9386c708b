//! Shutdown signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) trigger a graceful shutdown: the
//! HTTP server stops accepting connections and the cache warmer stops.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

/// Listens for OS signals and fans shutdown out over a watch channel.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns the signal listener task.
    ///
    /// If a handler cannot be installed the error is logged and the
    /// service runs on; it can still be stopped by other means.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => info!("received SIGINT, initiating shutdown"),
            }
            let _ = shutdown_tx.send(true);
            debug!("signal listener stopped");
        });
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received Ctrl+C, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
            }
        });
    }

    /// Returns a future-like signal that completes on shutdown.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal. Also returns if the sender is gone.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|shutdown| *shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_signal_wait() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();

        let trigger = handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger_shutdown();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), shutdown.wait()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn signal_already_triggered_completes_immediately() {
        let handler = SignalHandler::new();
        handler.trigger_shutdown();

        let result =
            tokio::time::timeout(Duration::from_millis(50), handler.shutdown().wait()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn untriggered_signal_keeps_waiting() {
        let handler = SignalHandler::new();
        let result =
            tokio::time::timeout(Duration::from_millis(20), handler.shutdown().wait()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dropped_handler_releases_waiters() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();
        drop(handler);

        let result = tokio::time::timeout(Duration::from_millis(50), shutdown.wait()).await;
        assert!(result.is_ok());
    }
}
