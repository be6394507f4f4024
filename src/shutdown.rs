//! Shutdown coordination for order-ingest
//!
//! A termination signal flips a `watch` channel from `false` to `true` once.
//! The consume-commit loop only looks at it while waiting for the next
//! message, so an in-flight write and commit always run to completion.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sending half of the cancellation signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request cancellation
    ///
    /// Returns `true` only for the call that actually flipped the signal.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }
}

/// Receiving half of the cancellation signal
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// If every trigger is dropped without firing, this never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a connected trigger/signal pair
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Wait for CTRL+C or SIGTERM
pub async fn wait_for_termination() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = ctrl_c => {
                result?;
                tracing::info!("Received CTRL+C, starting graceful shutdown");
            },
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, starting graceful shutdown");
            },
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("Received CTRL+C, starting graceful shutdown");
    }

    Ok(())
}

/// Spawn the task that turns a termination signal into cancellation
///
/// If signal handlers cannot be installed the error is logged and the
/// pipeline keeps running without graceful shutdown.
pub fn spawn_coordinator(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(()) => {
                trigger.trigger();
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
            },
        }
    })
}
