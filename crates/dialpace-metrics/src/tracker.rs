//! Call lifecycle tracking
//!
//! Provider callbacks arrive out of order, sometimes more than once, and sometimes
//! for calls this process never placed. The tracker folds whatever arrives into
//! one [`CallMetricsRecord`] per call id and never rejects a transition.
//!
//! Terminal events append the record to the finalized log. A provider retrying a
//! terminal webhook therefore yields a second log line for the same call; nothing
//! here can tell a retry from a genuine second terminal event without a provider
//! idempotency key, so consumers dedupe downstream if they need to.

use chrono::{DateTime, Utc};
use dialpace_core::fail_open::fail_open;
use dialpace_core::{CallEvent, CallStatus, EventKind, Result, TerminalStatus, UNKNOWN_DESTINATION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::storage::MetricsLog;

/// Default log key for finalized call records
pub const FINALIZED_LOG: &str = "call_metrics.jsonl";

/// Metrics for one outbound call attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetricsRecord {
    /// Identifier generated before the call is placed
    pub call_id: String,
    /// Identifier assigned by the provider; first non-empty value wins
    pub provider_call_id: Option<String>,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub first_progress_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub post_dial_delay_ms: Option<i64>,
    pub answer_delay_ms: Option<i64>,
    pub total_duration_ms: Option<i64>,
    pub final_status: CallStatus,
}

impl CallMetricsRecord {
    pub fn new(
        call_id: impl Into<String>,
        destination: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            provider_call_id: None,
            destination: destination.into(),
            created_at,
            first_progress_at: None,
            connected_at: None,
            ended_at: None,
            post_dial_delay_ms: None,
            answer_delay_ms: None,
            total_duration_ms: None,
            final_status: CallStatus::Initiated,
        }
    }

    /// Attach the provider id unless one is already set. Returns whether it changed.
    pub fn attach_provider_id(&mut self, provider_call_id: Option<&str>) -> bool {
        match provider_call_id.map(str::trim) {
            Some(id) if !id.is_empty() && self.provider_call_id.is_none() => {
                self.provider_call_id = Some(id.to_string());
                true
            }
            _ => false,
        }
    }

    /// First progress/ringing signal. Later progress events keep the first timestamp.
    pub fn mark_progress(&mut self, ts: DateTime<Utc>) {
        if self.first_progress_at.is_none() {
            self.first_progress_at = Some(ts);
            self.post_dial_delay_ms = Some(self.elapsed_ms(ts));
        }
        self.final_status = CallStatus::Progress;
    }

    /// Answered. A reconnect moves `connected_at` forward.
    pub fn mark_connected(&mut self, ts: DateTime<Utc>) {
        self.connected_at = Some(ts);
        self.answer_delay_ms = Some(self.elapsed_ms(ts));
        self.final_status = CallStatus::Connected;
    }

    pub fn mark_ended(&mut self, ts: DateTime<Utc>, status: TerminalStatus) {
        self.ended_at = Some(ts);
        self.total_duration_ms = Some(self.elapsed_ms(ts));
        self.final_status = status.into();
    }

    pub fn is_delivered(&self) -> bool {
        self.connected_at.is_some()
    }

    fn elapsed_ms(&self, ts: DateTime<Utc>) -> i64 {
        (ts - self.created_at).num_milliseconds()
    }
}

/// In-memory registry of call records
///
/// Constructed once and shared (`Arc`) with every handler that needs it. Each
/// operation holds the write lock for its whole read-modify-write; the finalized
/// log is written after the lock is released, from a snapshot.
pub struct CallTracker {
    calls: Arc<RwLock<HashMap<String, CallMetricsRecord>>>,
    log: Arc<MetricsLog>,
    log_key: String,
}

impl CallTracker {
    pub fn new(log: Arc<MetricsLog>) -> Self {
        Self::with_log_key(log, FINALIZED_LOG)
    }

    pub fn with_log_key(log: Arc<MetricsLog>, log_key: impl Into<String>) -> Self {
        Self {
            calls: Arc::new(RwLock::new(HashMap::new())),
            log,
            log_key: log_key.into(),
        }
    }

    /// Register a call, or return the existing record unchanged
    pub async fn register(
        &self,
        call_id: &str,
        destination: &str,
        ts: Option<DateTime<Utc>>,
    ) -> CallMetricsRecord {
        let mut calls = self.calls.write().await;
        ensure(&mut calls, call_id, destination, ts.unwrap_or_else(Utc::now)).clone()
    }

    /// Set the provider id if unset. `None` when the call is unknown.
    pub async fn attach_provider_id(
        &self,
        call_id: &str,
        provider_call_id: Option<&str>,
    ) -> Option<CallMetricsRecord> {
        let mut calls = self.calls.write().await;
        let record = calls.get_mut(call_id)?;
        if record.attach_provider_id(provider_call_id) {
            debug!("Call {} bound to provider id {:?}", call_id, record.provider_call_id);
        }
        Some(record.clone())
    }

    pub async fn on_progress(
        &self,
        call_id: &str,
        provider_call_id: Option<&str>,
        ts: DateTime<Utc>,
    ) -> CallMetricsRecord {
        let mut calls = self.calls.write().await;
        let record = ensure(&mut calls, call_id, UNKNOWN_DESTINATION, ts);
        record.attach_provider_id(provider_call_id);
        record.mark_progress(ts);
        info!(
            "Call {} progress (pdd {:?} ms)",
            call_id, record.post_dial_delay_ms
        );
        record.clone()
    }

    pub async fn on_connected(
        &self,
        call_id: &str,
        provider_call_id: Option<&str>,
        ts: DateTime<Utc>,
    ) -> CallMetricsRecord {
        let mut calls = self.calls.write().await;
        let record = ensure(&mut calls, call_id, UNKNOWN_DESTINATION, ts);
        record.attach_provider_id(provider_call_id);
        record.mark_connected(ts);
        info!(
            "Call {} connected (answer delay {:?} ms)",
            call_id, record.answer_delay_ms
        );
        record.clone()
    }

    /// Finalize a call and append it to the finalized log
    ///
    /// Every invocation appends one line, including repeats for the same call.
    pub async fn on_ended(
        &self,
        call_id: &str,
        provider_call_id: Option<&str>,
        ts: DateTime<Utc>,
        status: TerminalStatus,
    ) -> CallMetricsRecord {
        let snapshot = {
            let mut calls = self.calls.write().await;
            let record = ensure(&mut calls, call_id, UNKNOWN_DESTINATION, ts);
            if record.final_status.is_terminal() {
                warn!(
                    "Call {} already ended as {}, recording {} again",
                    call_id, record.final_status, status
                );
            }
            record.attach_provider_id(provider_call_id);
            record.mark_ended(ts, status);
            record.clone()
        };

        info!(
            "Call {} ended: {} after {:?} ms",
            call_id, snapshot.final_status, snapshot.total_duration_ms
        );

        fail_open("call_tracker::finalize", || {
            self.log.append(&self.log_key, &snapshot)
        })
        .await;

        snapshot
    }

    /// Route a validated webhook event to the matching lifecycle operation
    ///
    /// Calls never seen locally are registered first, using the event's `to` as
    /// destination when present. Unrecognized events are logged and leave the
    /// registry untouched (`None`).
    pub async fn apply_event(&self, event: &CallEvent) -> Option<CallMetricsRecord> {
        if let EventKind::Unrecognized(name) = &event.kind {
            info!("Ignoring unrecognized event '{}' for call {}", name, event.call_id);
            return None;
        }

        if let Some(details) = &event.details {
            debug!("Event details for call {}: {}", event.call_id, details);
        }

        let destination = event.to.as_deref().unwrap_or(UNKNOWN_DESTINATION);
        self.register(&event.call_id, destination, Some(event.ts)).await;

        let provider_id = event.provider_call_id.as_deref();
        let record = match event.kind {
            EventKind::Progress => self.on_progress(&event.call_id, provider_id, event.ts).await,
            EventKind::Connected => self.on_connected(&event.call_id, provider_id, event.ts).await,
            EventKind::Ended(status) => {
                self.on_ended(&event.call_id, provider_id, event.ts, status)
                    .await
            }
            EventKind::Unrecognized(_) => return None,
        };
        Some(record)
    }

    pub async fn get(&self, call_id: &str) -> Option<CallMetricsRecord> {
        let calls = self.calls.read().await;
        calls.get(call_id).cloned()
    }

    pub async fn get_all(&self) -> HashMap<String, CallMetricsRecord> {
        let calls = self.calls.read().await;
        calls.clone()
    }

    /// Finalized records, as written by `on_ended`
    pub async fn load_finalized(&self) -> Result<Vec<CallMetricsRecord>> {
        self.log.read_all(&self.log_key).await
    }
}

fn ensure<'a>(
    calls: &'a mut HashMap<String, CallMetricsRecord>,
    call_id: &str,
    destination: &str,
    created_at: DateTime<Utc>,
) -> &'a mut CallMetricsRecord {
    calls.entry(call_id.to_string()).or_insert_with(|| {
        debug!("Registered call {} -> {}", call_id, destination);
        CallMetricsRecord::new(call_id, destination, created_at)
    })
}
