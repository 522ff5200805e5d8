//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, channel status reporting, and Prometheus
//! metrics. Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (checks the pipeline channel)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::cache::ConfigCacheStore;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: HealthStatus,
    /// Console version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Pipeline channel status.
    pub channel: ChannelStatus,
    /// Cache statistics.
    pub cache: CacheStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Channel connected, snapshots flowing.
    Healthy,
    /// Channel down; serving the last good cache state.
    Degraded,
}

/// Pipeline channel status.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    /// Whether the channel is currently connected.
    pub connected: bool,
    /// Snapshot frames received since startup.
    pub snapshots_received: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    /// Live cache records.
    pub entities: usize,
    /// Records with uncommitted edits.
    pub entities_with_changes: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    channel_connected: AtomicBool,
    snapshots_received: AtomicU64,
    store: Arc<ConfigCacheStore>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, store: Arc<ConfigCacheStore>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            channel_connected: AtomicBool::new(false),
            snapshots_received: AtomicU64::new(0),
            store,
        }
    }

    /// Update the channel connection flag.
    pub fn set_channel_connected(&self, connected: bool) {
        self.channel_connected.store(connected, Ordering::SeqCst);
    }

    /// Whether the channel is currently connected.
    #[must_use]
    pub fn channel_connected(&self) -> bool {
        self.channel_connected.load(Ordering::SeqCst)
    }

    /// Count one received snapshot frame.
    pub fn record_snapshot(&self) {
        self.snapshots_received.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("health server stopped");
        Ok(())
    }
}

/// Build the health router (exposed for tests).
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.channel_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connected = state.channel_connected();
    let stats = state.store.stats();

    HealthResponse {
        status: if connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        channel: ChannelStatus {
            connected,
            snapshots_received: state.snapshots_received.load(Ordering::Relaxed),
        },
        cache: CacheStatus {
            entities: stats.total_entities,
            entities_with_changes: stats.entities_with_changes,
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "test-0.0.1".to_string(),
            Arc::new(ConfigCacheStore::default()),
        ))
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn disconnected_channel_reports_degraded() {
        let state = test_state();
        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Degraded);

        state.set_channel_connected(true);
        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let app = router(test_state());

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_channel_state() {
        let state = test_state();
        let app = router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_channel_connected(true);
        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_cache_stats() {
        let store = Arc::new(ConfigCacheStore::default());
        let mut tree = crate::domain::tree::ConfigTree::new();
        tree.set("ROEThresholdStrategy", "roe_threshold", 0.2);
        store.reconcile("BTC", tree);

        let state = Arc::new(HealthServerState::new("test".to_string(), store));
        let app = router(state);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["cache"]["entities"], 1);
        assert_eq!(json["status"], "degraded");
    }
}
