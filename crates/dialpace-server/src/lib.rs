//! # dialpace-server
//!
//! HTTP surface for dialpace: provider webhooks in, call and batch control,
//! and the aggregated call statistics.

mod error;
mod server;

pub use error::ApiError;
pub use server::{router, serve, AppState, SharedState};

use dialpace_core::{CallPlacer, DialpaceConfig};
use dialpace_metrics::{CallTracker, MetricsLog};
use dialpace_scheduler::{BatchManager, DailyCapStore, Dialer};
use std::sync::Arc;

/// Wire the tracker, dialer and batch manager from configuration
pub fn build_state(config: &DialpaceConfig, placer: Arc<dyn CallPlacer>) -> SharedState {
    let log = Arc::new(MetricsLog::new(&config.storage.data_dir));
    let tracker = Arc::new(CallTracker::with_log_key(
        log,
        config.storage.metrics_file.clone(),
    ));

    let dialer = Arc::new(
        Dialer::new(tracker.clone(), placer, config.event_url())
            .with_caller_id(config.provider.caller_id.clone()),
    );

    let caps = Arc::new(DailyCapStore::new(config.caps_path()));
    let batches = Arc::new(BatchManager::new(caps, dialer.clone()));

    Arc::new(AppState {
        tracker,
        dialer,
        batches,
        batch_defaults: config.batch.clone(),
    })
}
