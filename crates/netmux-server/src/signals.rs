//! Shutdown signalling.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) trigger a graceful shutdown. The
//! same trigger can be pulled programmatically, which tests and embedders use.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// Broadcasts a one-way shutdown flag.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Installs the signal handlers and spawns the task that waits on them.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> ServerResult<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &'static str| {
            signal(kind).map_err(|source| ServerError::Signal {
                signal: name,
                source,
            })
        };
        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;

        let tx = Arc::clone(&self.tx);
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
            }
            let _ = tx.send(true);
            debug!("Signal listener stopped");
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> ServerResult<()> {
        let tx = Arc::clone(&self.tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, initiating shutdown");
                let _ = tx.send(true);
            }
        });
        Ok(())
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means every sender is gone, which cannot happen while
        // `self` holds one.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}
