//! HTTP server for Prometheus metrics endpoint.

use crate::manager::{ManagerState, SessionExit, StatsSnapshot};
use crate::metrics::MetricsRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 9090).into(),
        }
    }
}

impl MetricsServerConfig {
    /// Creates a config with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

/// Shared state for the metrics server.
///
/// Refreshed by the application from [`CameraManager`](crate::CameraManager)
/// accessors; the server only ever reads it.
pub struct MetricsState {
    registry: MetricsRegistry,
    camera: CameraHealth,
}

/// Body of the `/health` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraHealth {
    /// Whether a camera is open and producing frames.
    pub available: bool,
    /// Manager lifecycle state.
    pub state: ManagerState,
    /// Why the most recent capture session ended, if one has.
    pub last_exit: Option<SessionExit>,
    /// Capture sessions started so far.
    pub sessions_started: u64,
}

impl Default for CameraHealth {
    fn default() -> Self {
        Self {
            available: false,
            state: ManagerState::Idle,
            last_exit: None,
            sessions_started: 0,
        }
    }
}

impl MetricsState {
    /// Publishes a fresh view of the manager.
    pub fn update(
        &mut self,
        snapshot: &StatsSnapshot,
        state: ManagerState,
        last_exit: Option<SessionExit>,
    ) {
        self.registry.update(snapshot);
        self.camera = CameraHealth {
            available: snapshot.available,
            state,
            last_exit,
            sessions_started: snapshot.sessions_started,
        };
    }

    /// What `/health` currently reports.
    pub fn camera(&self) -> &CameraHealth {
        &self.camera
    }
}

/// HTTP server for exposing Prometheus metrics.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<RwLock<MetricsState>>,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                camera: CameraHealth::default(),
            })),
        }
    }

    /// Returns a reference to the shared state for updating metrics.
    pub fn state(&self) -> Arc<RwLock<MetricsState>> {
        Arc::clone(&self.state)
    }

    /// Starts the HTTP server.
    ///
    /// This method runs the server until it is shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            "Metrics server listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<RwLock<MetricsState>>>,
) -> impl IntoResponse {
    let state = state.read().await;

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
///
/// The process is healthy whenever it answers; camera problems are
/// reported in the body, not the status code.
async fn health_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    let camera = state.read().await.camera.clone();
    (StatusCode::OK, Json(camera))
}
