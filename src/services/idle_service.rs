//! Keeps the process alive after setup until something tells it to stop.

use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info};

/// Sleeps in coarse fixed intervals until the stop future resolves.
#[derive(Debug, Clone, Copy)]
pub struct IdleKeeper {
    pub interval: Duration,
}

impl Default for IdleKeeper {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

impl IdleKeeper {
    /// Returns the number of full intervals slept once `stop` resolves.
    pub async fn run_until<F>(&self, stop: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut intervals = 0u64;
        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!(intervals, "stop requested, leaving idle loop");
                    return intervals;
                }
                _ = sleep(self.interval) => {
                    intervals += 1;
                    debug!(intervals, "still idle");
                }
            }
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
