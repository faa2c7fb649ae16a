/// Graceful shutdown for the supervisor loop.
///
/// SIGINT (Ctrl-C) and SIGTERM flip a watch flag the loop selects on at every
/// sleep, so supervision ends cleanly: the child tree is killed and the status
/// file removed, instead of relying on an external kill of the supervisor.
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Install SIGINT/SIGTERM handlers and return the handle the loop polls.
    pub fn install() -> std::io::Result<Self> {
        let (tx, rx) = watch::channel(false);
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => tracing::info!("SIGINT received, shutting down"),
                _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
            }
            let _ = tx.send(true);
        });

        Ok(Self { rx })
    }

    /// Handle driven by the returned sender instead of OS signals, for tests.
    #[allow(dead_code)]
    pub fn manual() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Non-blocking check.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested; pends forever otherwise.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Sender gone without firing: shutdown can no longer arrive.
                std::future::pending::<()>().await;
            }
        }
    }
}
