//! Single-call placement path shared by the API and the batch runner

use dialpace_core::{CallPlacer, PlaceCallRequest, Result};
use dialpace_metrics::{CallMetricsRecord, CallTracker};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Registers a call with the tracker, then asks the provider to dial it
pub struct Dialer {
    tracker: Arc<CallTracker>,
    placer: Arc<dyn CallPlacer>,
    event_url: String,
    caller_id: Option<String>,
}

impl Dialer {
    pub fn new(
        tracker: Arc<CallTracker>,
        placer: Arc<dyn CallPlacer>,
        event_url: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            placer,
            event_url: event_url.into(),
            caller_id: None,
        }
    }

    pub fn with_caller_id(mut self, caller_id: Option<String>) -> Self {
        self.caller_id = caller_id;
        self
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    /// Place one call to `destination`
    ///
    /// The call id is generated and registered before the provider is contacted,
    /// so webhooks that race the placement response still find their record. A
    /// placement error is returned as is; the registered record stays `initiated`.
    pub async fn dial(&self, destination: &str, tag: Option<&str>) -> Result<CallMetricsRecord> {
        let call_id = Uuid::new_v4().to_string();
        let record = self.tracker.register(&call_id, destination, None).await;

        let request = PlaceCallRequest {
            call_id: call_id.clone(),
            destination: destination.to_string(),
            event_url: self.event_url.clone(),
            caller_id: self.caller_id.clone(),
            tag: tag.map(str::to_string),
        };

        if let Err(e) = self.placer.place_call(&request).await {
            warn!("Placement of call {} to {} failed: {}", call_id, destination, e);
            return Err(e);
        }

        info!("Placed call {} to {}", call_id, destination);
        Ok(self.tracker.get(&call_id).await.unwrap_or(record))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use dialpace_core::{CallPlacer, DialpaceError, PlaceCallRequest, Result};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every request; fails the attempts whose 1-based index is listed
    #[derive(Default)]
    pub struct ScriptedPlacer {
        pub requests: Mutex<Vec<PlaceCallRequest>>,
        pub fail_on: HashSet<usize>,
    }

    impl ScriptedPlacer {
        pub fn failing_on(attempts: &[usize]) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_on: attempts.iter().copied().collect(),
            }
        }

        pub fn destinations(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.destination.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CallPlacer for ScriptedPlacer {
        async fn place_call(&self, request: &PlaceCallRequest) -> Result<()> {
            let attempt = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len()
            };

            if self.fail_on.contains(&attempt) {
                Err(DialpaceError::Placement(format!("scripted failure #{}", attempt)))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedPlacer;
    use super::*;
    use dialpace_core::{CallStatus, DialpaceError};
    use dialpace_metrics::MetricsLog;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_dial_registers_and_places() {
        let dir = tempdir().unwrap();
        let tracker = Arc::new(CallTracker::new(Arc::new(MetricsLog::new(dir.path()))));
        let placer = Arc::new(ScriptedPlacer::default());
        let dialer = Dialer::new(tracker.clone(), placer.clone(), "http://hooks/events")
            .with_caller_id(Some("+19990000".to_string()));

        let record = dialer.dial("+15550100", Some("promo")).await.unwrap();

        assert_eq!(record.destination, "+15550100");
        assert_eq!(record.final_status, CallStatus::Initiated);
        assert!(tracker.get(&record.call_id).await.is_some());

        let sent = placer.requests.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].call_id, record.call_id);
        assert_eq!(sent[0].event_url, "http://hooks/events");
        assert_eq!(sent[0].caller_id.as_deref(), Some("+19990000"));
        assert_eq!(sent[0].tag.as_deref(), Some("promo"));
    }

    #[tokio::test]
    async fn test_dial_surfaces_placement_error() {
        let dir = tempdir().unwrap();
        let tracker = Arc::new(CallTracker::new(Arc::new(MetricsLog::new(dir.path()))));
        let dialer = Dialer::new(
            tracker.clone(),
            Arc::new(ScriptedPlacer::failing_on(&[1])),
            "http://hooks/events",
        );

        let result = dialer.dial("+15550100", None).await;
        assert!(matches!(result, Err(DialpaceError::Placement(_))));

        let all = tracker.get_all().await;
        assert_eq!(all.len(), 1);
        assert!(all.values().all(|r| r.final_status == CallStatus::Initiated));
    }
}
