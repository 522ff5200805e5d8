//! Operator API
//!
//! JSON HTTP surface consumed by the terminal UI: read access to cached
//! configuration, parameter edits, and the commit/discard flow. Every
//! operation goes through the [`ConsoleService`]; this layer only maps
//! HTTP shapes to service calls and service errors to status codes.
//!
//! # Endpoints
//!
//! - `GET    /entities` - cached entities with dirty flags
//! - `GET    /config/{symbol}` - record snapshot (original, modified, dirty)
//! - `GET    /config/{symbol}/changes` - pending diff
//! - `PUT    /config/{symbol}/{namespace}/{parameter}` - set one field
//! - `POST   /config/{symbol}/commit` - transmit pending diff, advance baseline
//! - `POST   /config/{symbol}/discard` - revert pending edits
//! - `DELETE /config/{symbol}` - drop the cache record

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{CommitOutcome, ConsoleService, ServiceError};
use crate::domain::cache::CacheError;
use crate::domain::tree::{ConfigTree, ScalarValue};
use crate::infrastructure::metrics;

// =============================================================================
// Response Types
// =============================================================================

/// One entry of the entity listing.
#[derive(Debug, Clone, Serialize)]
pub struct EntityEntry {
    /// Instrument symbol.
    pub symbol: String,
    /// Whether uncommitted edits are pending.
    pub dirty: bool,
}

/// Entity listing with aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct EntitiesResponse {
    /// Cached entities, sorted by symbol.
    pub entities: Vec<EntityEntry>,
    /// Number of live records.
    pub total: usize,
    /// Number of records with pending edits.
    pub with_changes: usize,
}

/// Full record view for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    /// Instrument symbol.
    pub symbol: String,
    /// Baseline tree.
    pub original: ConfigTree,
    /// Operator-visible tree.
    pub modified: ConfigTree,
    /// Whether uncommitted edits are pending.
    pub dirty: bool,
}

/// Commit result.
#[derive(Debug, Clone, Serialize)]
pub struct CommitResponse {
    /// "sent" when a diff was transmitted, "clean" when nothing was pending.
    pub status: &'static str,
    /// The transmitted diff, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<ConfigTree>,
}

// =============================================================================
// Errors
// =============================================================================

/// API errors mapped to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No cache record for the entity.
    #[error("no cache record for entity: {0}")]
    UnknownEntity(String),

    /// Blank value rejected by the edit surface.
    #[error("blank value for {0}")]
    BlankValue(String),

    /// Request body is not a JSON scalar.
    #[error("value must be a JSON number, boolean, or string")]
    InvalidScalar,

    /// Outbound transmission failed.
    #[error("update transmit failed: {0}")]
    Transmit(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Cache(CacheError::UnknownEntity(entity)) => Self::UnknownEntity(entity),
            ServiceError::Cache(CacheError::BlankValue {
                namespace,
                parameter,
            }) => Self::BlankValue(format!("{namespace}.{parameter}")),
            ServiceError::Sink(e) => Self::Transmit(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownEntity(_) => StatusCode::NOT_FOUND,
            Self::BlankValue(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidScalar => StatusCode::BAD_REQUEST,
            Self::Transmit(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the operator API router (exposed for tests).
#[must_use]
pub fn router(service: Arc<ConsoleService>) -> Router {
    Router::new()
        .route("/entities", get(list_entities))
        .route("/config/{symbol}", get(get_record).delete(remove_record))
        .route("/config/{symbol}/changes", get(get_changes))
        .route("/config/{symbol}/{namespace}/{parameter}", put(set_field))
        .route("/config/{symbol}/commit", post(commit))
        .route("/config/{symbol}/discard", post(discard))
        .with_state(service)
}

/// Operator API HTTP server.
pub struct ApiServer {
    port: u16,
    service: Arc<ConsoleService>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, service: Arc<ConsoleService>, cancel: CancellationToken) -> Self {
        Self {
            port,
            service,
            cancel,
        }
    }

    /// Run the API server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError`] if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let app = router(self.service);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "operator API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("operator API stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_entities(State(service): State<Arc<ConsoleService>>) -> Json<EntitiesResponse> {
    let entities: Vec<_> = service
        .overview()
        .into_iter()
        .map(|entry| EntityEntry {
            symbol: entry.entity,
            dirty: entry.dirty,
        })
        .collect();
    let stats = service.stats();

    Json(EntitiesResponse {
        entities,
        total: stats.total_entities,
        with_changes: stats.entities_with_changes,
    })
}

async fn get_record(
    State(service): State<Arc<ConsoleService>>,
    Path(symbol): Path<String>,
) -> Result<Json<RecordResponse>, ApiError> {
    let snapshot = service
        .snapshot(&symbol)
        .ok_or_else(|| ApiError::UnknownEntity(symbol.clone()))?;

    Ok(Json(RecordResponse {
        symbol,
        original: snapshot.original,
        modified: snapshot.modified,
        dirty: snapshot.dirty,
    }))
}

async fn get_changes(
    State(service): State<Arc<ConsoleService>>,
    Path(symbol): Path<String>,
) -> Result<Json<ConfigTree>, ApiError> {
    if service.snapshot(&symbol).is_none() {
        return Err(ApiError::UnknownEntity(symbol));
    }
    Ok(Json(service.changes(&symbol)))
}

async fn set_field(
    State(service): State<Arc<ConsoleService>>,
    Path((symbol, namespace, parameter)): Path<(String, String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let value = scalar_from_body(&body)?;
    service.set_field(&symbol, &namespace, &parameter, value)?;
    metrics::record_edit();
    metrics::set_store_stats(service.stats());
    Ok(StatusCode::NO_CONTENT)
}

async fn commit(
    State(service): State<Arc<ConsoleService>>,
    Path(symbol): Path<String>,
) -> Result<Json<CommitResponse>, ApiError> {
    let outcome = service.commit(&symbol).await?;
    let response = match outcome {
        CommitOutcome::Sent(update) => {
            metrics::record_commit();
            CommitResponse {
                status: "sent",
                update: Some(update),
            }
        }
        CommitOutcome::Clean => CommitResponse {
            status: "clean",
            update: None,
        },
    };
    metrics::set_store_stats(service.stats());
    Ok(Json(response))
}

async fn discard(
    State(service): State<Arc<ConsoleService>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.discard(&symbol)?;
    metrics::record_discard();
    metrics::set_store_stats(service.stats());
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_record(
    State(service): State<Arc<ConsoleService>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError> {
    if service.remove(&symbol) {
        metrics::set_store_stats(service.stats());
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownEntity(symbol))
    }
}

/// Accept exactly a JSON scalar body for field writes.
fn scalar_from_body(body: &serde_json::Value) -> Result<ScalarValue, ApiError> {
    match body {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(ScalarValue::Number)
            .ok_or(ApiError::InvalidScalar),
        serde_json::Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
        serde_json::Value::String(s) => Ok(ScalarValue::Text(s.clone())),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Err(ApiError::InvalidScalar)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{UpdateSink, UpdateSinkError};
    use crate::domain::cache::{ConfigCacheStore, EntityId};

    /// Sink that records transmitted updates for assertions.
    #[derive(Debug, Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(EntityId, ConfigTree)>>,
    }

    #[async_trait]
    impl UpdateSink for RecordingSink {
        async fn send_update(
            &self,
            entity: EntityId,
            changes: ConfigTree,
        ) -> Result<(), UpdateSinkError> {
            self.sent.lock().push((entity, changes));
            Ok(())
        }
    }

    fn seeded_app() -> (Router, Arc<RecordingSink>) {
        let store = Arc::new(ConfigCacheStore::default());
        let sink = Arc::new(RecordingSink::default());
        let service = Arc::new(ConsoleService::new(store, Arc::clone(&sink) as Arc<dyn UpdateSink>));

        let mut tree = ConfigTree::new();
        tree.set("ROEThresholdStrategy", "roe_threshold", 0.20);
        service.apply_snapshot(HashMap::from([("BTC".to_string(), tree)]));

        (router(service), sink)
    }

    fn put_field(symbol: &str, namespace: &str, parameter: &str, body: &str) -> Request<Body> {
        Request::put(format!("/config/{symbol}/{namespace}/{parameter}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn edit_then_commit_flow() {
        let (app, sink) = seeded_app();

        let response = app
            .clone()
            .oneshot(put_field("BTC", "ROEThresholdStrategy", "roe_threshold", "0.15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(
                Request::get("/config/BTC/changes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let changes = body_json(response).await;
        assert_eq!(changes["ROEThresholdStrategy"]["roe_threshold"], 0.15);

        let response = app
            .clone()
            .oneshot(
                Request::post("/config/BTC/commit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let commit = body_json(response).await;
        assert_eq!(commit["status"], "sent");

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "BTC");

        drop(sent);

        // Record is clean afterwards.
        let response = app
            .oneshot(Request::get("/config/BTC").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let record = body_json(response).await;
        assert_eq!(record["dirty"], false);
        assert_eq!(record["original"]["ROEThresholdStrategy"]["roe_threshold"], 0.15);
    }

    #[tokio::test]
    async fn commit_without_edits_is_clean() {
        let (app, sink) = seeded_app();

        let response = app
            .oneshot(
                Request::post("/config/BTC/commit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let commit = body_json(response).await;
        assert_eq!(commit["status"], "clean");
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_entity_maps_to_not_found() {
        let (app, _sink) = seeded_app();

        let response = app
            .clone()
            .oneshot(put_field("DOGE", "ROEThresholdStrategy", "roe_threshold", "0.15"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::get("/config/DOGE").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_value_maps_to_unprocessable() {
        let (app, _sink) = seeded_app();

        let response = app
            .oneshot(put_field("BTC", "ROEThresholdStrategy", "mode", "\"   \""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn non_scalar_body_maps_to_bad_request() {
        let (app, _sink) = seeded_app();

        let response = app
            .oneshot(put_field("BTC", "ROEThresholdStrategy", "roe_threshold", "[1, 2]"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn discard_reverts_pending_edits() {
        let (app, _sink) = seeded_app();

        let _ = app
            .clone()
            .oneshot(put_field("BTC", "ROEThresholdStrategy", "roe_threshold", "0.15"))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post("/config/BTC/discard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::get("/config/BTC").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let record = body_json(response).await;
        assert_eq!(record["dirty"], false);
        assert_eq!(record["modified"]["ROEThresholdStrategy"]["roe_threshold"], 0.2);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let (app, _sink) = seeded_app();

        let response = app
            .clone()
            .oneshot(
                Request::delete("/config/BTC")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(Request::get("/config/BTC").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Deleting again is a 404.
        let response = app
            .oneshot(
                Request::delete("/config/BTC")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entity_listing_reports_dirty_flags() {
        let (app, _sink) = seeded_app();

        let _ = app
            .clone()
            .oneshot(put_field("BTC", "ROEThresholdStrategy", "roe_threshold", "0.15"))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::get("/entities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listing = body_json(response).await;
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["with_changes"], 1);
        assert_eq!(listing["entities"][0]["symbol"], "BTC");
        assert_eq!(listing["entities"][0]["dirty"], true);
    }
}
