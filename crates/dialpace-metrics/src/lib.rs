//! # dialpace-metrics
//!
//! Call lifecycle metrics for dialpace.
//!
//! This crate provides:
//! - The call tracker that folds provider webhooks into one record per call
//! - The append-only JSONL log finalized records are written to
//! - Aggregation of finalized records into delivery and latency figures

mod stats;
mod storage;
mod tracker;

pub use stats::{compute_stats, CallStats};
pub use storage::MetricsLog;
pub use tracker::{CallMetricsRecord, CallTracker, FINALIZED_LOG};
