//! Background batch execution with observable status
//!
//! Batches can take hours of paced dialing, so the request that starts one gets a
//! [`BatchHandle`] back immediately. The manager keeps a [`BatchStatus`] per batch
//! that moves from `running` to `completed` or `failed` when the task ends.
//! Running batches cannot be cancelled; they finish or the process exits.
//! Only the most recent finished batches are kept; running ones are never pruned.

use chrono::{DateTime, Utc};
use dialpace_core::{DialpaceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::caps::DailyCapStore;
use crate::dialer::Dialer;
use crate::schedule::{run_batch, BatchReport, BatchRequest};

/// Lifecycle of a submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Completed { report: BatchReport },
    Failed { error: String },
}

/// Status record kept for every submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub id: String,
    pub destinations: usize,
    pub repeat: u32,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: BatchState,
}

/// Handle to a spawned batch
pub struct BatchHandle {
    pub id: String,
    join: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    /// Wait for the batch to finish
    pub async fn wait(self) -> Result<BatchReport> {
        self.join
            .await
            .map_err(|e| DialpaceError::Other(format!("Batch task {} aborted: {}", self.id, e)))?
    }
}

/// Finished batch statuses retained by default
const DEFAULT_BATCH_HISTORY: usize = 100;

/// Spawns batches and tracks their status
pub struct BatchManager {
    caps: Arc<DailyCapStore>,
    dialer: Arc<Dialer>,
    batches: Arc<RwLock<HashMap<String, BatchStatus>>>,
    history_limit: usize,
}

impl BatchManager {
    pub fn new(caps: Arc<DailyCapStore>, dialer: Arc<Dialer>) -> Self {
        Self {
            caps,
            dialer,
            batches: Arc::new(RwLock::new(HashMap::new())),
            history_limit: DEFAULT_BATCH_HISTORY,
        }
    }

    /// Keep at most `limit` finished batches
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Validate and start a batch in the background
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchHandle> {
        let request = request.normalized()?;
        let id = Uuid::new_v4().to_string();

        let status = BatchStatus {
            id: id.clone(),
            destinations: request.destinations.len(),
            repeat: request.repeat,
            dry_run: request.dry_run,
            started_at: Utc::now(),
            finished_at: None,
            state: BatchState::Running,
        };
        self.batches.write().await.insert(id.clone(), status);

        info!(
            "Starting batch {}: {} numbers x {} rounds{}",
            id,
            request.destinations.len(),
            request.repeat,
            if request.dry_run { " (dry run)" } else { "" }
        );

        let caps = self.caps.clone();
        let dialer = self.dialer.clone();
        let batches = self.batches.clone();
        let batch_id = id.clone();
        let history_limit = self.history_limit;

        let join = tokio::spawn(async move {
            let result = run_batch(&request, &caps, &dialer).await;

            let state = match &result {
                Ok(report) => BatchState::Completed {
                    report: report.clone(),
                },
                Err(e) => {
                    error!("Batch {} failed: {}", batch_id, e);
                    BatchState::Failed {
                        error: e.to_string(),
                    }
                }
            };

            {
                let mut batches = batches.write().await;
                if let Some(status) = batches.get_mut(&batch_id) {
                    status.state = state;
                    status.finished_at = Some(Utc::now());
                }
                prune_finished(&mut batches, history_limit);
            }

            result
        });

        Ok(BatchHandle { id, join })
    }

    pub async fn status(&self, id: &str) -> Result<BatchStatus> {
        let batches = self.batches.read().await;
        batches
            .get(id)
            .cloned()
            .ok_or_else(|| DialpaceError::BatchNotFound(id.to_string()))
    }

    /// All known batches, newest first
    pub async fn list(&self) -> Vec<BatchStatus> {
        let batches = self.batches.read().await;
        let mut all: Vec<BatchStatus> = batches.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }
}

/// Drop the oldest finished batches beyond `limit`
fn prune_finished(batches: &mut HashMap<String, BatchStatus>, limit: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = batches
        .values()
        .filter_map(|b| b.finished_at.map(|at| (at, b.id.clone())))
        .collect();
    if finished.len() <= limit {
        return;
    }

    finished.sort();
    let excess = finished.len() - limit;
    for (_, id) in finished.into_iter().take(excess) {
        batches.remove(&id);
    }
}
