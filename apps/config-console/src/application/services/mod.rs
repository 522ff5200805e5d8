//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`ConsoleService`]: applies inbound pipeline snapshots to the cache
//!   store and fronts the operator edit surface, including the
//!   capture-diff → transmit → commit ordering.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::ports::{UpdateSink, UpdateSinkError};
use crate::domain::cache::{
    CacheError, ConfigCacheStore, EntityId, RecordSnapshot, StoreStats,
};
use crate::domain::tree::{ConfigTree, ScalarValue};

// =============================================================================
// Types
// =============================================================================

/// Errors surfaced to the operator API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Cache-level rejection (unknown entity, blank value).
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Outbound transmission failed; the pending edits were left intact.
    #[error(transparent)]
    Sink(#[from] UpdateSinkError),
}

/// Result of a commit request.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// A diff was transmitted and the baseline advanced.
    Sent(ConfigTree),
    /// Nothing was pending; no frame was sent.
    Clean,
}

/// Per-entity summary for the overview listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOverview {
    /// Entity identifier (instrument symbol).
    pub entity: EntityId,
    /// Whether the entity carries uncommitted edits.
    pub dirty: bool,
}

/// Totals for one applied snapshot frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Entities reconciled from the frame.
    pub entities: usize,
    /// Records created by this frame (first push for the entity).
    pub created: usize,
    /// Pending edits carried across merges, summed over entities.
    pub preserved_edits: usize,
}

// =============================================================================
// Console Service
// =============================================================================

/// Orchestrates the cache store, the inbound snapshot stream, and the
/// outbound update sink.
///
/// Presentation code (the HTTP API) goes through this service rather than
/// touching the store, so the commit ordering and logging live in one place.
pub struct ConsoleService {
    store: Arc<ConfigCacheStore>,
    sink: Arc<dyn UpdateSink>,
}

impl ConsoleService {
    /// Create a service over the given store and update sink.
    #[must_use]
    pub fn new(store: Arc<ConfigCacheStore>, sink: Arc<dyn UpdateSink>) -> Self {
        Self { store, sink }
    }

    /// The underlying store (for health reporting and the eviction sweep).
    #[must_use]
    pub fn store(&self) -> &Arc<ConfigCacheStore> {
        &self.store
    }

    // =========================================================================
    // Inbound: snapshot intake
    // =========================================================================

    /// Reconcile every entity carried by one snapshot frame.
    ///
    /// Entities are independent; an edit pending on one never affects the
    /// merge of another.
    pub fn apply_snapshot(&self, configs: HashMap<EntityId, ConfigTree>) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();

        for (entity, incoming) in configs {
            let outcome = self.store.reconcile(entity.clone(), incoming);
            summary.entities += 1;
            if outcome.created {
                summary.created += 1;
                tracing::info!(symbol = %entity, "cache record created from pipeline push");
            } else if outcome.preserved_edits > 0 {
                tracing::debug!(
                    symbol = %entity,
                    preserved = outcome.preserved_edits,
                    "pipeline push merged around pending edits"
                );
            }
            summary.preserved_edits += outcome.preserved_edits;
        }

        summary
    }

    // =========================================================================
    // Edit surface
    // =========================================================================

    /// Write one parameter into an entity's edited tree.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError`] for unknown entities and blank values.
    pub fn set_field(
        &self,
        entity: &str,
        namespace: &str,
        parameter: &str,
        value: ScalarValue,
    ) -> Result<(), ServiceError> {
        self.store.set_field(entity, namespace, parameter, value)?;
        tracing::debug!(symbol = %entity, namespace, parameter, "parameter edited");
        Ok(())
    }

    /// Write a batch of parameters into an entity's edited tree.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError`]; one blank value rejects the whole batch.
    pub fn set_fields(&self, entity: &str, updates: &ConfigTree) -> Result<(), ServiceError> {
        self.store.set_fields(entity, updates)?;
        tracing::debug!(
            symbol = %entity,
            parameters = updates.parameter_count(),
            "parameter batch edited"
        );
        Ok(())
    }

    /// Owned snapshot of an entity's record.
    #[must_use]
    pub fn snapshot(&self, entity: &str) -> Option<RecordSnapshot> {
        self.store.get(entity)
    }

    /// Pending diff for an entity (empty if unknown).
    #[must_use]
    pub fn changes(&self, entity: &str) -> ConfigTree {
        self.store.get_changes(entity)
    }

    /// Revert all pending edits for an entity.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnknownEntity`] if the entity has no live record.
    pub fn discard(&self, entity: &str) -> Result<(), ServiceError> {
        self.store.discard(entity)?;
        tracing::info!(symbol = %entity, "pending edits discarded");
        Ok(())
    }

    /// Drop an entity's cache record entirely.
    ///
    /// Returns `false` if no record existed.
    pub fn remove(&self, entity: &str) -> bool {
        let removed = self.store.remove(entity);
        if removed {
            tracing::info!(symbol = %entity, "cache record removed");
        }
        removed
    }

    /// Dirty-flagged listing of all cached entities.
    #[must_use]
    pub fn overview(&self) -> Vec<EntityOverview> {
        let mut entries: Vec<_> = self
            .store
            .entities()
            .into_iter()
            .map(|entity| {
                let dirty = self.store.is_dirty(&entity);
                EntityOverview { entity, dirty }
            })
            .collect();
        entries.sort_by(|a, b| a.entity.cmp(&b.entity));
        entries
    }

    /// Aggregate store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    // =========================================================================
    // Commit flow
    // =========================================================================

    /// Transmit the pending diff for an entity and advance its baseline.
    ///
    /// The diff is captured before the baseline moves; an empty diff sends
    /// nothing and leaves the record untouched. If transmission fails the
    /// record stays dirty, so the operator can retry; the baseline only
    /// advances after the frame was handed to the transport.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Cache`] for unknown entities,
    /// [`ServiceError::Sink`] when the transport rejects the frame.
    pub async fn commit(&self, entity: &str) -> Result<CommitOutcome, ServiceError> {
        // Capture first: commit() erases the diff.
        let snapshot = self
            .store
            .get(entity)
            .ok_or_else(|| CacheError::UnknownEntity(entity.to_string()))?;
        let changes = snapshot.modified.changes_from(&snapshot.original);

        if changes.is_empty() {
            tracing::debug!(symbol = %entity, "commit requested with no pending edits");
            return Ok(CommitOutcome::Clean);
        }

        self.sink
            .send_update(entity.to_string(), changes.clone())
            .await?;
        self.store.commit(entity)?;

        tracing::info!(
            symbol = %entity,
            parameters = changes.parameter_count(),
            "configuration update committed"
        );
        Ok(CommitOutcome::Sent(changes))
    }
}

// =============================================================================
// Tests
// =============================================================================
