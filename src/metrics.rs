// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tree-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tree_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: create, update, delete
//! - `operation`: backing-store call (fetch, create, update, delete)
//! - `outcome` / `status`: success, error, busy, ...

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a mutation appended to the operation log
pub fn record_operation_logged(kind: &str) {
    counter!(
        "tree_cache_operations_logged_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the outcome of a hydration (cached, fetched, not_found, deleted, error, busy)
pub fn record_load(outcome: &str) {
    counter!(
        "tree_cache_loads_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a replay of the operation log
pub fn record_apply(success: bool, applied: usize, failed: usize) {
    counter!(
        "tree_cache_applies_total",
        "status" => if success { "success" } else { "partial" }
    )
    .increment(1);
    counter!("tree_cache_applied_operations_total").increment(applied as u64);
    counter!("tree_cache_failed_operations_total").increment(failed as u64);
}

/// Record a load/apply turned away by the in-flight policy
pub fn record_busy(entry_point: &str) {
    counter!(
        "tree_cache_busy_rejections_total",
        "entry_point" => entry_point.to_string()
    )
    .increment(1);
}

/// Record a backing-store call result
pub fn record_backend_call(operation: &str, status: &str) {
    counter!(
        "tree_cache_backend_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record backing-store call latency
pub fn record_backend_latency(operation: &str, duration: Duration) {
    histogram!(
        "tree_cache_backend_call_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a full cache clear triggered by an orphaned fragment
pub fn record_orphan_recovery() {
    counter!("tree_cache_orphan_recoveries_total").increment(1);
}

/// Record how a hydrated chain entered the cache (merge or replace)
pub fn record_chain_splice(mode: &str) {
    counter!(
        "tree_cache_chain_splices_total",
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Set current node-set size
pub fn set_cache_nodes(count: usize) {
    gauge!("tree_cache_nodes").set(count as f64);
}

/// Set operations awaiting replay
pub fn set_pending_operations(count: usize) {
    gauge!("tree_cache_pending_operations").set(count as f64);
}

/// A timing guard that records backing-store latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_backend_latency(self.operation, self.start.elapsed());
    }
}
