//! Graceful shutdown and signal handling.
//!
//! SIGTERM/SIGINT stop both listeners: no new connections are accepted and
//! in-flight requests get a grace period to complete.

use axum_server::Handle;

use crate::config::SHUTDOWN_GRACE_PERIOD;

/// Triggers graceful shutdown of every listener of one server.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    handles: Vec<Handle>,
}

impl ShutdownHandle {
    pub(crate) fn new(handles: Vec<Handle>) -> Self {
        Self { handles }
    }

    /// Stop accepting connections and drain the open ones.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
        }
    }
}

/// Setup graceful shutdown on SIGTERM and SIGINT.
pub fn setup_shutdown_handler(handle: ShutdownHandle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down servers");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down servers");
            }
        }

        handle.shutdown();
        tracing::info!(
            grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
            "Graceful shutdown initiated, waiting for connections to close"
        );
    });
}
