//! HTTP front for the health checker

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use herald_common::Signal;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::{HealthChecker, HealthConfig, HealthError};

/// Probes must answer within this long
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Routes for the three probes, sharing one checker
pub fn router(health_checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/status", get(status_handler))
        .with_state(health_checker)
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(PROBE_TIMEOUT)))
}

pub struct HealthServer {
    listener: TcpListener,
    router: Router,
}

impl HealthServer {
    /// Bind the health server
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(
        config: &HealthConfig,
        health_checker: Arc<HealthChecker>,
    ) -> Result<Self, HealthError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| HealthError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "Health endpoints listening"
        );

        Ok(Self {
            listener,
            router: router(health_checker),
        })
    }

    /// The bound address, useful when listening on port 0
    ///
    /// # Errors
    ///
    /// If the socket has gone away.
    pub fn local_addr(&self) -> Result<SocketAddr, HealthError> {
        self.listener
            .local_addr()
            .map_err(|e| HealthError::ServerError(e.to_string()))
    }

    /// Answer probes until a [`Signal`] arrives, then finish open requests
    ///
    /// # Errors
    ///
    /// If accepting connections fails.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), HealthError> {
        tracing::info!("Health server running");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Health server draining");
            })
            .await
            .map_err(|e| HealthError::ServerError(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

async fn liveness_handler(State(health_checker): State<Arc<HealthChecker>>) -> Response {
    let code = if health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, "alive").into_response()
}

/// 200 when ready, otherwise 503 with the failing inputs
async fn readiness_handler(State(health_checker): State<Arc<HealthChecker>>) -> Response {
    let status = health_checker.get_status();
    if status.ready {
        (StatusCode::OK, "ready").into_response()
    } else {
        tracing::warn!(
            store_ready = status.store_ready,
            processor_ready = status.processor_ready,
            providers_ready = status.providers_ready,
            queue_size = status.queue_size,
            max_queue_size = status.max_queue_size,
            "Readiness probe failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}

/// The last full report; 503 until the processor has published one
async fn status_handler(State(health_checker): State<Arc<HealthChecker>>) -> Response {
    match health_checker.report() {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No health report yet").into_response(),
    }
}
