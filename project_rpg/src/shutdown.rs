use tokio::sync::watch;

/// Sender side, held by main; triggers shutdown.
#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Receiver side, cloned to the tick thread and the web server.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    pub async fn wait(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check for the tick thread.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    pub fn into_inner(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "signal handlers unavailable, falling back to ctrl-c");
            }
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("received Ctrl+C");
}
