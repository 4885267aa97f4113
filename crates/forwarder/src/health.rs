//! Liveness endpoint served alongside the pipeline.

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ForwardError;

pub const HEALTH_BODY: &str = "HEALTHY";

/// Grace period for in-flight requests once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    pub async fn bind(host: &str, port: u16) -> Result<Self, ForwardError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).await.map_err(|err| {
            ForwardError::health_server(format!("failed to bind {addr}: {err}"))
        })?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ForwardError> {
        self.listener
            .local_addr()
            .map_err(|err| ForwardError::health_server(format!("no local address: {err}")))
    }

    /// Serve until cancelled. Graceful shutdown is bounded by a short grace
    /// period; when it elapses the server is closed forcibly.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ForwardError> {
        let addr = self.local_addr()?;
        info!("health server listening on http://{addr}");

        let graceful = cancel.clone();
        let server = axum::serve(self.listener, router()).with_graceful_shutdown(async move {
            graceful.cancelled().await;
        });
        let server = async move { server.await };

        tokio::select! {
            result = server => {
                result.map_err(|err| ForwardError::health_server(err.to_string()))?;
                info!("health server shut down");
                Ok(())
            }
            _ = forced_close_after_grace(cancel) => {
                warn!(grace = ?SHUTDOWN_GRACE, "health server graceful shutdown timed out, closing");
                Ok(())
            }
        }
    }
}

/// Bind and serve in one step; bind failures surface once through the
/// caller's completion signal and are not retried.
pub async fn run_health_server(
    host: &str,
    port: u16,
    cancel: CancellationToken,
) -> Result<(), ForwardError> {
    HealthServer::bind(host, port).await?.serve(cancel).await
}

fn router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> &'static str {
    HEALTH_BODY
}

async fn forced_close_after_grace(cancel: CancellationToken) {
    cancel.cancelled().await;
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
