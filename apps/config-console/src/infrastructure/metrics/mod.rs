//! Prometheus Metrics Module
//!
//! Exposes console metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Channel**: frames received and rejected, reconnect attempts
//! - **Cache**: reconciles, evictions, live and dirty record counts
//! - **Edits**: operator edits, commits, and discards
//!
//! # Integration
//!
//! Metrics are rendered at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::cache::StoreStats;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "console_snapshots_received_total",
        "Snapshot frames received from the pipeline channel"
    );
    describe_counter!(
        "console_protocol_errors_total",
        "Inbound frames rejected at the codec boundary"
    );
    describe_counter!(
        "console_channel_reconnects_total",
        "Channel reconnection attempts"
    );
    describe_counter!(
        "console_reconciles_total",
        "Entity trees merged into the cache"
    );
    describe_counter!(
        "console_evictions_total",
        "Cache records evicted after TTL expiry"
    );
    describe_counter!("console_edits_total", "Operator parameter edits accepted");
    describe_counter!(
        "console_commits_total",
        "Configuration updates committed and transmitted"
    );
    describe_counter!("console_discards_total", "Pending edit sets discarded");

    describe_gauge!("console_channel_connected", "Channel connection state (0/1)");
    describe_gauge!("console_cached_entities", "Live cache records");
    describe_gauge!(
        "console_dirty_entities",
        "Cache records with uncommitted edits"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one received snapshot frame and the entities it reconciled.
pub fn record_snapshot(entities: u64) {
    counter!("console_snapshots_received_total").increment(1);
    counter!("console_reconciles_total").increment(entities);
}

/// Record a frame rejected by the codec.
pub fn record_protocol_error() {
    counter!("console_protocol_errors_total").increment(1);
}

/// Record a channel reconnect attempt.
pub fn record_reconnect() {
    counter!("console_channel_reconnects_total").increment(1);
}

/// Record evicted cache records.
pub fn record_evictions(count: u64) {
    if count > 0 {
        counter!("console_evictions_total").increment(count);
    }
}

/// Record an accepted operator edit.
pub fn record_edit() {
    counter!("console_edits_total").increment(1);
}

/// Record a committed configuration update.
pub fn record_commit() {
    counter!("console_commits_total").increment(1);
}

/// Record a discarded edit set.
pub fn record_discard() {
    counter!("console_discards_total").increment(1);
}

/// Update the channel connection gauge.
pub fn set_channel_connected(connected: bool) {
    gauge!("console_channel_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the cache size gauges from store statistics.
#[allow(clippy::cast_precision_loss)]
pub fn set_store_stats(stats: StoreStats) {
    gauge!("console_cached_entities").set(stats.total_entities as f64);
    gauge!("console_dirty_entities").set(stats.entities_with_changes as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_absent_before_init() {
        // Recording without an installed recorder is a silent no-op; the
        // helpers must not panic either way.
        record_snapshot(3);
        record_protocol_error();
        set_channel_connected(true);
        set_store_stats(StoreStats {
            total_entities: 2,
            entities_with_changes: 1,
        });
    }
}
