//! Configuration Reconciliation Cache
//!
//! Per-entity cache records pairing the last authoritative configuration tree
//! from the pipeline (`original`) with the tree the operator sees and edits
//! (`modified`), plus the reconciliation merge that integrates fresh pipeline
//! pushes without discarding uncommitted edits.
//!
//! # Design
//!
//! The store is the only shared mutable state in the system. One lock guards
//! the whole registry so that reconciliation and edit-surface operations are
//! mutually exclusive and each observes a consistent (original, modified)
//! pair. Callers receive owned snapshots, never references into the registry:
//! eviction may invalidate a record between any two operations.
//!
//! Records are created exclusively by reconciliation: the first pipeline push
//! for an entity wins, and edit operations against an unknown entity fail with
//! [`CacheError::UnknownEntity`] instead of creating state the pipeline never
//! acknowledged.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::domain::tree::{ConfigTree, ScalarValue};

// =============================================================================
// Types
// =============================================================================

/// The unit of configuration identity (an instrument symbol).
pub type EntityId = String;

/// Inactivity window after which a record is evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Edit operation against an entity the pipeline has never pushed.
    #[error("no cache record for entity: {0}")]
    UnknownEntity(String),

    /// Blank operator input must be rejected, not stored as a placeholder.
    #[error("blank value for {namespace}.{parameter}")]
    BlankValue {
        /// Namespace of the rejected write.
        namespace: String,
        /// Parameter of the rejected write.
        parameter: String,
    },
}

/// One cached entity: baseline and edited trees plus activity tracking.
#[derive(Debug, Clone)]
struct CacheRecord {
    /// Tree last known acknowledged-equivalent to the pipeline's state.
    original: ConfigTree,
    /// Tree the operator reads and writes; pipeline pushes merged in.
    modified: ConfigTree,
    /// Most recent merge or edit; drives TTL eviction.
    last_activity: Instant,
}

impl CacheRecord {
    fn pending_changes(&self) -> ConfigTree {
        self.modified.changes_from(&self.original)
    }

    fn dirty(&self) -> bool {
        !self.pending_changes().is_empty()
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_activity) > ttl
    }
}

/// Owned view of a cache record handed to callers.
#[derive(Debug, Clone)]
pub struct RecordSnapshot {
    /// Baseline tree.
    pub original: ConfigTree,
    /// Operator-visible tree.
    pub modified: ConfigTree,
    /// Whether any uncommitted edit is pending.
    pub dirty: bool,
}

/// Result of integrating one authoritative push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether this push created the record.
    pub created: bool,
    /// Number of pending operator edits carried across the merge.
    pub preserved_edits: usize,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live cache records.
    pub total_entities: usize,
    /// Number of records with uncommitted edits.
    pub entities_with_changes: usize,
}

// =============================================================================
// Store
// =============================================================================

/// Process-wide registry of cache records.
///
/// Constructed explicitly at application start and injected into whatever
/// owns the pipeline channel; there is no global instance.
#[derive(Debug)]
pub struct ConfigCacheStore {
    records: RwLock<HashMap<EntityId, CacheRecord>>,
    ttl: Duration,
}

impl Default for ConfigCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ConfigCacheStore {
    /// Create a store with the given inactivity TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The configured inactivity TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    // =========================================================================
    // Record lifecycle
    // =========================================================================

    /// Get an owned snapshot of an entity's record.
    ///
    /// Returns `None` for unknown entities and for records whose TTL has
    /// lapsed; the expiry check runs on every access, and an expired record
    /// is removed on the spot.
    #[must_use]
    pub fn get(&self, entity: &str) -> Option<RecordSnapshot> {
        let mut records = self.records.write();
        let record = Self::live(&mut records, entity, self.ttl)?;
        Some(RecordSnapshot {
            original: record.original.clone(),
            modified: record.modified.clone(),
            dirty: record.dirty(),
        })
    }

    /// Create or fully replace a record.
    pub fn upsert(&self, entity: impl Into<EntityId>, original: ConfigTree, modified: ConfigTree) {
        self.records.write().insert(
            entity.into(),
            CacheRecord {
                original,
                modified,
                last_activity: Instant::now(),
            },
        );
    }

    /// Refresh an entity's activity timestamp without changing contents.
    ///
    /// Returns `false` if the entity is unknown or already expired.
    pub fn touch(&self, entity: &str) -> bool {
        let mut records = self.records.write();
        match Self::live(&mut records, entity, self.ttl) {
            Some(record) => {
                record.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove every record whose last activity is older than the TTL.
    ///
    /// Returns the number of evicted records. Expiry is also checked lazily
    /// on every access, so this sweep only matters for records nothing reads.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !record.expired(now, self.ttl));
        before - records.len()
    }

    /// Explicitly discard an entity's record.
    ///
    /// Returns `false` if no record existed.
    pub fn remove(&self, entity: &str) -> bool {
        self.records.write().remove(entity).is_some()
    }

    /// Entities with live records.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        let now = Instant::now();
        self.records
            .read()
            .iter()
            .filter(|(_, record)| !record.expired(now, self.ttl))
            .map(|(entity, _)| entity.clone())
            .collect()
    }

    /// Aggregate statistics over live records.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let records = self.records.read();
        let live = records
            .values()
            .filter(|record| !record.expired(now, self.ttl));

        let mut stats = StoreStats::default();
        for record in live {
            stats.total_entities += 1;
            if record.dirty() {
                stats.entities_with_changes += 1;
            }
        }
        stats
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Integrate a freshly pushed authoritative tree for an entity.
    ///
    /// The first push creates the record with identical trees. On later
    /// pushes, the operator's pending edits are computed fresh against the
    /// current baseline, both trees are rebased onto the incoming push, and
    /// the edits are re-applied field by field: every untouched field reflects
    /// the freshest pipeline value, every edited field keeps the operator's
    /// value until committed or discarded.
    pub fn reconcile(&self, entity: impl Into<EntityId>, incoming: ConfigTree) -> ReconcileOutcome {
        let entity = entity.into();
        let mut records = self.records.write();
        Self::drop_if_expired(&mut records, &entity, self.ttl);

        match records.entry(entity) {
            Entry::Vacant(slot) => {
                slot.insert(CacheRecord {
                    original: incoming.clone(),
                    modified: incoming,
                    last_activity: Instant::now(),
                });
                ReconcileOutcome {
                    created: true,
                    preserved_edits: 0,
                }
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                // Pending edits are recomputed here, never cached across pushes.
                let changes = record.pending_changes();

                let mut modified = incoming.clone();
                modified.apply(&changes);

                record.original = incoming;
                record.modified = modified;
                record.last_activity = Instant::now();

                ReconcileOutcome {
                    created: false,
                    preserved_edits: changes.parameter_count(),
                }
            }
        }
    }

    // =========================================================================
    // Edit surface
    // =========================================================================

    /// Write one parameter into an entity's modified tree.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnknownEntity`] if the pipeline has never pushed this
    /// entity (records are never created through the edit surface), and
    /// [`CacheError::BlankValue`] for blank input, which is rejected rather
    /// than stored.
    pub fn set_field(
        &self,
        entity: &str,
        namespace: &str,
        parameter: &str,
        value: ScalarValue,
    ) -> Result<(), CacheError> {
        if value.is_blank() {
            return Err(CacheError::BlankValue {
                namespace: namespace.to_string(),
                parameter: parameter.to_string(),
            });
        }

        let mut records = self.records.write();
        let record = Self::live(&mut records, entity, self.ttl)
            .ok_or_else(|| CacheError::UnknownEntity(entity.to_string()))?;

        record.modified.set(namespace, parameter, value);
        record.last_activity = Instant::now();
        Ok(())
    }

    /// Write a batch of parameters into an entity's modified tree.
    ///
    /// The batch is validated up front and applied atomically: one blank
    /// value rejects the whole batch.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::set_field`].
    pub fn set_fields(&self, entity: &str, updates: &ConfigTree) -> Result<(), CacheError> {
        for (namespace, parameter, value) in updates.parameters() {
            if value.is_blank() {
                return Err(CacheError::BlankValue {
                    namespace: namespace.clone(),
                    parameter: parameter.clone(),
                });
            }
        }

        let mut records = self.records.write();
        let record = Self::live(&mut records, entity, self.ttl)
            .ok_or_else(|| CacheError::UnknownEntity(entity.to_string()))?;

        record.modified.apply(updates);
        record.last_activity = Instant::now();
        Ok(())
    }

    /// Whether the entity has uncommitted edits. Unknown entities are clean.
    #[must_use]
    pub fn is_dirty(&self, entity: &str) -> bool {
        let mut records = self.records.write();
        Self::live(&mut records, entity, self.ttl).is_some_and(|record| record.dirty())
    }

    /// The pending diff between baseline and edited trees.
    ///
    /// Empty for unknown entities.
    #[must_use]
    pub fn get_changes(&self, entity: &str) -> ConfigTree {
        let mut records = self.records.write();
        Self::live(&mut records, entity, self.ttl)
            .map(|record| record.pending_changes())
            .unwrap_or_default()
    }

    /// Read access to the operator-visible tree for display.
    #[must_use]
    pub fn modified(&self, entity: &str) -> Option<ConfigTree> {
        let mut records = self.records.write();
        Self::live(&mut records, entity, self.ttl).map(|record| record.modified.clone())
    }

    /// Revert all pending edits back to the baseline.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnknownEntity`] if no live record exists.
    pub fn discard(&self, entity: &str) -> Result<(), CacheError> {
        let mut records = self.records.write();
        let record = Self::live(&mut records, entity, self.ttl)
            .ok_or_else(|| CacheError::UnknownEntity(entity.to_string()))?;

        record.modified = record.original.clone();
        record.last_activity = Instant::now();
        Ok(())
    }

    /// Accept the edited tree as the new baseline.
    ///
    /// Optimistic: the outbound update built from the pending diff is assumed
    /// accepted; there is no rollback path. Callers capture
    /// [`Self::get_changes`] *before* committing.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnknownEntity`] if no live record exists.
    pub fn commit(&self, entity: &str) -> Result<(), CacheError> {
        let mut records = self.records.write();
        let record = Self::live(&mut records, entity, self.ttl)
            .ok_or_else(|| CacheError::UnknownEntity(entity.to_string()))?;

        record.original = record.modified.clone();
        record.last_activity = Instant::now();
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Look up a record, removing it first if its TTL has lapsed.
    fn live<'a>(
        records: &'a mut HashMap<EntityId, CacheRecord>,
        entity: &str,
        ttl: Duration,
    ) -> Option<&'a mut CacheRecord> {
        Self::drop_if_expired(records, entity, ttl);
        records.get_mut(entity)
    }

    /// Remove the record if its TTL has lapsed.
    fn drop_if_expired(records: &mut HashMap<EntityId, CacheRecord>, entity: &str, ttl: Duration) {
        let now = Instant::now();
        if records.get(entity).is_some_and(|r| r.expired(now, ttl)) {
            records.remove(entity);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn push(store: &ConfigCacheStore, entity: &str, threshold: f64) -> ConfigTree {
        let mut tree = ConfigTree::new();
        tree.set("ROEThresholdStrategy", "roe_threshold", threshold);
        store.reconcile(entity, tree.clone());
        tree
    }

    #[test]
    fn first_push_creates_clean_record() {
        let store = ConfigCacheStore::default();
        let tree = push(&store, "BTC", 0.20);

        let snapshot = store.get("BTC").unwrap();
        assert_eq!(snapshot.original, tree);
        assert_eq!(snapshot.modified, tree);
        assert!(!snapshot.dirty);
        assert!(!store.is_dirty("BTC"));
    }

    #[test]
    fn reconcile_reports_creation() {
        let store = ConfigCacheStore::default();
        let mut tree = ConfigTree::new();
        tree.set("ROEThresholdStrategy", "roe_threshold", 0.20);

        let first = store.reconcile("BTC", tree.clone());
        let second = store.reconcile("BTC", tree);

        assert!(first.created);
        assert!(!second.created);
    }

    #[test]
    fn edit_sets_dirty_and_changes() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);

        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();

        assert!(store.is_dirty("BTC"));
        let changes = store.get_changes("BTC");
        assert_eq!(changes.parameter_count(), 1);
        assert_eq!(
            changes.get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.15))
        );
    }

    #[test]
    fn edit_of_unknown_entity_is_rejected() {
        let store = ConfigCacheStore::default();

        let err = store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap_err();

        assert_eq!(err, CacheError::UnknownEntity("BTC".to_string()));
        // Strict first-push-wins: no record may appear through the edit path.
        assert!(store.get("BTC").is_none());
    }

    #[test]
    fn blank_value_is_rejected_not_stored() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);

        let err = store
            .set_field("BTC", "ROEThresholdStrategy", "mode", "   ".into())
            .unwrap_err();

        assert!(matches!(err, CacheError::BlankValue { .. }));
        assert!(!store.is_dirty("BTC"));
        assert_eq!(store.modified("BTC").unwrap().get("ROEThresholdStrategy", "mode"), None);
    }

    #[test]
    fn push_preserves_pending_edit_and_adopts_new_fields() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);
        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();

        // Pipeline pushes a newer threshold plus a brand-new field.
        let mut incoming = ConfigTree::new();
        incoming.set("ROEThresholdStrategy", "roe_threshold", 0.20);
        incoming.set("ROEThresholdStrategy", "roe_take_profit", 0.25);
        let outcome = store.reconcile("BTC", incoming);

        assert_eq!(outcome.preserved_edits, 1);

        let snapshot = store.get("BTC").unwrap();
        // Edited field keeps the operator's value.
        assert_eq!(
            snapshot.modified.get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.15))
        );
        // Untouched field tracks the pipeline.
        assert_eq!(
            snapshot.modified.get("ROEThresholdStrategy", "roe_take_profit"),
            Some(&ScalarValue::Number(0.25))
        );
        // Baseline is the push, unmodified.
        assert_eq!(
            snapshot.original.get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.20))
        );
        assert!(snapshot.dirty);
    }

    #[test]
    fn commit_clears_dirty_and_adopts_edits_as_baseline() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);
        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();

        store.commit("BTC").unwrap();

        assert!(!store.is_dirty("BTC"));
        assert!(store.get_changes("BTC").is_empty());
        let snapshot = store.get("BTC").unwrap();
        assert_eq!(
            snapshot.original.get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.15))
        );
    }

    #[test]
    fn identical_push_after_commit_stays_clean() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);
        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();
        store.commit("BTC").unwrap();

        // Pipeline echoes the committed value back.
        let mut echo = ConfigTree::new();
        echo.set("ROEThresholdStrategy", "roe_threshold", 0.15);
        store.reconcile("BTC", echo);

        assert!(!store.is_dirty("BTC"));
    }

    #[test]
    fn discard_reverts_to_baseline() {
        let store = ConfigCacheStore::default();
        let tree = push(&store, "BTC", 0.20);
        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();

        store.discard("BTC").unwrap();

        let snapshot = store.get("BTC").unwrap();
        assert_eq!(snapshot.modified, tree);
        assert!(!snapshot.dirty);

        // Idempotent.
        store.discard("BTC").unwrap();
        assert!(!store.is_dirty("BTC"));
    }

    #[test]
    fn batch_edit_matches_single_edits() {
        let single = ConfigCacheStore::default();
        let batch = ConfigCacheStore::default();
        push(&single, "BTC", 0.20);
        push(&batch, "BTC", 0.20);

        single
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();
        single
            .set_field("BTC", "ATRStopLossStrategy", "use_trailing_stop", true.into())
            .unwrap();

        let mut updates = ConfigTree::new();
        updates.set("ROEThresholdStrategy", "roe_threshold", 0.15);
        updates.set("ATRStopLossStrategy", "use_trailing_stop", true);
        batch.set_fields("BTC", &updates).unwrap();

        assert_eq!(single.get_changes("BTC"), batch.get_changes("BTC"));
        assert_eq!(single.modified("BTC").unwrap(), batch.modified("BTC").unwrap());
    }

    #[test]
    fn batch_with_blank_value_rejects_whole_batch() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);

        let mut updates = ConfigTree::new();
        updates.set("ROEThresholdStrategy", "roe_threshold", 0.15);
        updates.set("ROEThresholdStrategy", "mode", "");

        assert!(store.set_fields("BTC", &updates).is_err());
        assert!(!store.is_dirty("BTC"));
    }

    #[test]
    fn expired_record_is_absent_on_get() {
        let store = ConfigCacheStore::new(Duration::from_millis(20));
        push(&store, "BTC", 0.20);

        std::thread::sleep(Duration::from_millis(40));

        assert!(store.get("BTC").is_none());
        // And the edit surface treats it as unknown.
        assert_eq!(
            store.discard("BTC").unwrap_err(),
            CacheError::UnknownEntity("BTC".to_string())
        );
    }

    #[test]
    fn touch_defers_expiry() {
        let store = ConfigCacheStore::new(Duration::from_millis(60));
        push(&store, "BTC", 0.20);

        std::thread::sleep(Duration::from_millis(40));
        assert!(store.touch("BTC"));
        std::thread::sleep(Duration::from_millis(40));

        // 80ms since creation but only 40ms since the touch.
        assert!(store.get("BTC").is_some());
    }

    #[test]
    fn evict_expired_sweeps_only_stale_records() {
        let store = ConfigCacheStore::new(Duration::from_millis(30));
        push(&store, "BTC", 0.20);
        std::thread::sleep(Duration::from_millis(50));
        push(&store, "ETH", 0.10);

        let evicted = store.evict_expired();

        assert_eq!(evicted, 1);
        assert!(store.get("BTC").is_none());
        assert!(store.get("ETH").is_some());
    }

    #[test]
    fn remove_discards_record() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);

        assert!(store.remove("BTC"));
        assert!(!store.remove("BTC"));
        assert!(store.get("BTC").is_none());
    }

    #[test]
    fn stats_count_dirty_entities() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);
        push(&store, "ETH", 0.10);
        store
            .set_field("BTC", "ROEThresholdStrategy", "roe_threshold", 0.15.into())
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.entities_with_changes, 1);

        let mut entities = store.entities();
        entities.sort();
        assert_eq!(entities, vec!["BTC".to_string(), "ETH".to_string()]);
    }

    #[test]
    fn upsert_replaces_record_wholesale() {
        let store = ConfigCacheStore::default();
        push(&store, "BTC", 0.20);

        let mut original = ConfigTree::new();
        original.set("ROEThresholdStrategy", "roe_threshold", 0.30);
        let mut modified = original.clone();
        modified.set("ROEThresholdStrategy", "roe_threshold", 0.35);

        store.upsert("BTC", original, modified);

        let snapshot = store.get("BTC").unwrap();
        assert!(snapshot.dirty);
        assert_eq!(
            snapshot.modified.get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.35))
        );
    }
}
