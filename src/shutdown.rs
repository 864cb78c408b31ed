//! Operator stop signals (Ctrl+C, SIGTERM).

use std::future;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{info, warn};

/// Create a shutdown signal receiver.
///
/// Returns a broadcast receiver that will receive a signal when
/// SIGINT or (on unix) SIGTERM is received.
pub fn shutdown_signal() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install Ctrl+C handler");
                future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C"),
            _ = terminate => info!("received SIGTERM"),
        }

        let _ = tx.send(());
    });

    rx
}

/// Cancellation handle observed by the monitor loop at tick boundaries
pub struct Shutdown {
    rx: broadcast::Receiver<()>,
    triggered: bool,
}

impl Shutdown {
    pub fn new(rx: broadcast::Receiver<()>) -> Self {
        Self {
            rx,
            triggered: false,
        }
    }

    /// Non-blocking check for a pending stop request
    pub fn is_triggered(&mut self) -> bool {
        if !self.triggered {
            self.triggered = match self.rx.try_recv() {
                Ok(()) | Err(TryRecvError::Lagged(_)) => true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
            };
        }
        self.triggered
    }

    /// Wait for a stop request. A dropped sender never resolves.
    pub async fn recv(&mut self) {
        if self.triggered {
            return;
        }
        match self.rx.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => self.triggered = true,
            Err(RecvError::Closed) => future::pending::<()>().await,
        }
    }
}
