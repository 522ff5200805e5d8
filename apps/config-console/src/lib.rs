#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Config Console - Live Configuration Reconciliation Service
//!
//! The state core of a terminal-style operator dashboard over a
//! high-frequency trading decision pipeline. Maintains one persistent
//! WebSocket to the pipeline, reconciles its authoritative configuration
//! snapshots with uncommitted operator edits, and exposes the edit surface
//! to the terminal UI over HTTP.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Trees, the diff engine, and the reconciliation cache
//!   - `tree`: ConfigTree, scalar values, structural diff
//!   - `cache`: per-entity records, TTL eviction, edit surface
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: outbound update sink contract
//!   - `services`: snapshot intake and the commit flow
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `channel`: WebSocket client, codec, wire messages
//!   - `api`: operator HTTP API
//!   - `config`: environment-driven settings
//!   - `health`: health + metrics endpoint
//!
//! # Data Flow
//!
//! ```text
//! Pipeline WS ──► Codec ──► Reconcile ──► Cache Store ◄──► Edit Surface ◄── Operator UI
//!                                              │                │
//!                                              └── diff ────────┴──► Update frame ──► Pipeline WS
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Configuration trees and the reconciliation cache.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::{
    CacheError, ConfigCacheStore, DEFAULT_TTL, EntityId, RecordSnapshot, ReconcileOutcome,
    StoreStats,
};
pub use domain::tree::{ConfigTree, ScalarValue};

// Application layer
pub use application::ports::{UpdateSink, UpdateSinkError};
pub use application::services::{
    CommitOutcome, ConsoleService, EntityOverview, ServiceError, SnapshotSummary,
};

// Channel adapters (for integration tests)
pub use infrastructure::channel::client::{
    ChannelClient, ChannelClientConfig, ChannelEvent, ChannelUpdateSink,
};
pub use infrastructure::channel::codec::{ChannelCodec, CodecError};
pub use infrastructure::channel::messages::{ConfigUpdateFrame, InboundMessage};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ConsoleSettings};

// Servers
pub use infrastructure::api::{ApiServer, ApiServerError};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
