// src/core/metrics.rs

//! Defines and registers Prometheus metrics for tree-connect monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of tree connects currently registered across all sessions.
    pub static ref ACTIVE_TREE_CONNECTS: Gauge =
        register_gauge!("treeconn_active_tree_connects", "Number of currently registered tree connects.").unwrap();

    // --- Counters ---
    /// The total number of successful tree connects.
    pub static ref TREE_CONNECTS_TOTAL: Counter =
        register_counter!("treeconn_tree_connects_total", "Total number of successful tree connects.").unwrap();
    /// The total number of tree connects torn down.
    pub static ref TREE_DISCONNECTS_TOTAL: Counter =
        register_counter!("treeconn_tree_disconnects_total", "Total number of tree connects torn down.").unwrap();
    /// Failed connects, labeled by error kind.
    pub static ref TREE_CONNECT_FAILURES_TOTAL: CounterVec =
        register_counter_vec!("treeconn_tree_connect_failures_total", "Total number of failed tree connects, labeled by kind.", &["kind"]).unwrap();
    /// Disconnects whose notification to the authorization daemon failed.
    pub static ref TREE_DISCONNECT_FAILURES_TOTAL: Counter =
        register_counter!("treeconn_tree_disconnect_failures_total", "Total number of disconnects whose daemon notification failed.").unwrap();

    // --- Histograms ---
    /// How long disconnects waited for in-flight requests to release the tree.
    pub static ref DISCONNECT_WAIT_SECONDS: Histogram =
        register_histogram!("treeconn_disconnect_wait_seconds", "Time a disconnect spent waiting for the tree to drain, in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
