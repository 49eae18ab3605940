use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers::liveness_probe;
use super::handlers::readiness_probe;
use super::handlers::Readiness;

pub const LIVENESS_PATH: &str = "/livenessProbe";
pub const READINESS_PATH: &str = "/readinessProbe";

/// HTTP server answering the kubelet probes.
pub struct ProbeServer {
    listen_addr: String,
    readiness: Readiness,
    shutdown_grace: Duration,
}

impl ProbeServer {
    pub fn new(port: u16, shutdown_grace: Duration) -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{port}"),
            readiness: Arc::new(AtomicBool::new(false)),
            shutdown_grace,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.readiness.store(ready, Ordering::SeqCst);
    }

    pub fn routes(&self) -> impl poem::Endpoint {
        Route::new()
            .at(LIVENESS_PATH, get(liveness_probe))
            .at(READINESS_PATH, get(readiness_probe))
            .data(self.readiness.clone())
            .with(Tracing)
    }

    /// Serves until `cancellation_token` is cancelled, then drains for at
    /// most the shutdown grace period.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or crashes
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting probe server on {}", self.listen_addr);
        let app = self.routes();
        let listener = TcpListener::bind(&self.listen_addr);

        let result = Server::new(listener)
            .run_with_graceful_shutdown(
                app,
                cancellation_token.cancelled_owned(),
                Some(self.shutdown_grace),
            )
            .await;
        match result {
            Ok(()) => {
                info!("Probe server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Probe server failed: {e}");
                Err(Report::new(ApiError::ServerError {
                    message: format!("Server failed: {e}"),
                }))
            }
        }
    }
}
