//! Signal handling for SIGTERM and SIGINT.
//!
//! A signal cancels the run's token. The transfer engine checks it between
//! attempts, so an upload already in flight finishes (and is verified)
//! before the run stops.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token observed by the transfer engine
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation without a signal
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then cancel the token
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), stopping after the current attempt...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping after the current attempt...");
            }
            _ = self.token.cancelled() => {}
        }

        self.token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
