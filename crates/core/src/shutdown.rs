use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful-shutdown coordinator. SIGTERM and Ctrl+C both cancel the token;
/// the scheduling loop and any helper tasks watch it.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The cancellation token all tasks should monitor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Listen for OS termination signals in the background.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to register SIGTERM handler");
                            return;
                        }
                    };
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("received SIGTERM, initiating shutdown");
                    }
                    _ = signal::ctrl_c() => {
                        tracing::info!("received Ctrl+C, initiating shutdown");
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = signal::ctrl_c().await;
                tracing::info!("received Ctrl+C, initiating shutdown");
            }
            token.cancel();
        });
    }
}
