//! Batch schedule construction and execution
//!
//! A batch is planned completely before the first call: every entry's delay is
//! drawn and every quota slot is reserved and persisted up front. Execution then
//! walks the plan strictly in order, one call at a time. A failed or crashed batch
//! has still spent its slots, so re-running it can never exceed the cap.

use dialpace_core::{DialpaceError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::caps::{DailyCapStore, DailyCounters};
use crate::dialer::Dialer;

/// Parameters for one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub destinations: Vec<String>,
    /// How many passes over `destinations`
    pub repeat: u32,
    pub min_delay_sec: u64,
    pub max_delay_sec: u64,
    /// Build and pace the schedule without contacting the provider
    pub dry_run: bool,
    /// Maximum calls per destination per calendar day
    pub daily_cap: u32,
    #[serde(default)]
    pub tag: Option<String>,
}

impl BatchRequest {
    /// Reject impossible pacing
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_sec > self.max_delay_sec {
            return Err(DialpaceError::Config(format!(
                "min delay {}s exceeds max delay {}s",
                self.min_delay_sec, self.max_delay_sec
            )));
        }
        Ok(())
    }

    /// Validate and drop blank numbers
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;

        self.destinations = self
            .destinations
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        Ok(self)
    }
}

/// One planned call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub destination: String,
    pub round: u32,
    /// Wait before placing this call
    pub delay_ms: u64,
}

/// An entry whose placement failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub destination: String,
    pub round: u32,
    pub error: String,
}

/// Outcome of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub scheduled: usize,
    /// Entries left out because the destination hit its daily cap
    pub skipped: usize,
    pub placed: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub entries: Vec<ScheduleEntry>,
    pub failures: Vec<EntryFailure>,
}

/// Plan a batch against `counters`, reserving a quota slot per entry
///
/// Returns the ordered entries and how many were skipped for quota. The request
/// must have passed [`BatchRequest::validate`].
pub fn build_schedule<R: Rng>(
    request: &BatchRequest,
    counters: &mut DailyCounters,
    rng: &mut R,
) -> (Vec<ScheduleEntry>, usize) {
    let min_ms = request.min_delay_sec.saturating_mul(1000);
    let max_ms = request.max_delay_sec.saturating_mul(1000);

    let mut entries = Vec::new();
    let mut skipped = 0;

    for round in 0..request.repeat {
        for destination in &request.destinations {
            let used = counters.count(destination);
            if used >= request.daily_cap {
                info!(
                    "Skipping {} in round {}: daily cap reached ({}/{})",
                    destination, round, used, request.daily_cap
                );
                skipped += 1;
                continue;
            }

            counters.increment(destination);
            entries.push(ScheduleEntry {
                destination: destination.clone(),
                round,
                delay_ms: rng.gen_range(min_ms..=max_ms),
            });
        }
    }

    (entries, skipped)
}

/// Run a batch to completion
///
/// The schedule is built against today's caps and the updated counters are saved
/// before any call, under the cap store lock. Each entry then waits its delay and
/// dials; a placement error is logged and recorded in the report, and the batch
/// moves on.
pub async fn run_batch(
    request: &BatchRequest,
    caps: &DailyCapStore,
    dialer: &Dialer,
) -> Result<BatchReport> {
    request.validate()?;

    let mut rng = StdRng::from_entropy();
    let (entries, skipped) = caps
        .reserve(|counters| build_schedule(request, counters, &mut rng))
        .await?;

    execute_schedule(request, entries, skipped, dialer).await
}

/// Walk a prepared schedule in order
pub async fn execute_schedule(
    request: &BatchRequest,
    entries: Vec<ScheduleEntry>,
    skipped: usize,
    dialer: &Dialer,
) -> Result<BatchReport> {
    let mut report = BatchReport {
        scheduled: entries.len(),
        skipped,
        dry_run: request.dry_run,
        ..Default::default()
    };

    info!(
        "Batch scheduled: {} calls, {} skipped for quota{}",
        report.scheduled,
        report.skipped,
        if request.dry_run { " (dry run)" } else { "" }
    );

    let total = entries.len();
    for (i, entry) in entries.iter().enumerate() {
        if entry.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
        }

        if request.dry_run {
            info!(
                "[{}/{}] dry run: would call {} (round {})",
                i + 1,
                total,
                entry.destination,
                entry.round
            );
            continue;
        }

        match dialer.dial(&entry.destination, request.tag.as_deref()).await {
            Ok(record) => {
                info!(
                    "[{}/{}] placed call {} to {}",
                    i + 1,
                    total,
                    record.call_id,
                    entry.destination
                );
                report.placed += 1;
            }
            Err(e) => {
                warn!(
                    "[{}/{}] call to {} failed, continuing: {}",
                    i + 1,
                    total,
                    entry.destination,
                    e
                );
                report.failed += 1;
                report.failures.push(EntryFailure {
                    destination: entry.destination.clone(),
                    round: entry.round,
                    error: e.to_string(),
                });
            }
        }
    }

    report.entries = entries;
    info!(
        "Batch finished: {} placed, {} failed, {} skipped",
        report.placed, report.failed, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::testing::ScriptedPlacer;
    use chrono::Local;
    use dialpace_metrics::{CallTracker, MetricsLog};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn request(destinations: &[&str], repeat: u32, daily_cap: u32) -> BatchRequest {
        BatchRequest {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            repeat,
            min_delay_sec: 0,
            max_delay_sec: 0,
            dry_run: false,
            daily_cap,
            tag: None,
        }
    }

    fn today() -> DailyCounters {
        DailyCounters::empty(Local::now().date_naive())
    }

    fn dialer_with(placer: Arc<ScriptedPlacer>) -> (TempDir, Dialer) {
        let dir = tempdir().unwrap();
        let tracker = Arc::new(CallTracker::new(Arc::new(MetricsLog::new(dir.path()))));
        (dir, Dialer::new(tracker, placer, "http://hooks/events"))
    }

    #[test]
    fn test_repeat_two_over_two_destinations() {
        let mut req = request(&["+100", "+200"], 2, 10);
        req.min_delay_sec = 5;
        req.max_delay_sec = 12;
        let mut counters = today();
        let mut rng = StdRng::seed_from_u64(7);

        let (entries, skipped) = build_schedule(&req, &mut counters, &mut rng);

        assert_eq!(skipped, 0);
        assert_eq!(entries.len(), 4);
        let order: Vec<(&str, u32)> = entries
            .iter()
            .map(|e| (e.destination.as_str(), e.round))
            .collect();
        assert_eq!(
            order,
            vec![("+100", 0), ("+200", 0), ("+100", 1), ("+200", 1)]
        );
        assert!(entries
            .iter()
            .all(|e| (5_000..=12_000).contains(&e.delay_ms)));
        assert_eq!(counters.count("+100"), 2);
        assert_eq!(counters.count("+200"), 2);
    }

    #[test]
    fn test_capped_destination_never_scheduled() {
        let req = request(&["+100", "+200"], 5, 1);
        let mut counters = today();
        counters.increment("+100");
        let mut rng = StdRng::seed_from_u64(1);

        let (entries, skipped) = build_schedule(&req, &mut counters, &mut rng);

        assert!(entries.iter().all(|e| e.destination != "+100"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].destination, "+200");
        assert_eq!(skipped, 9);
    }

    #[test]
    fn test_cap_limits_rounds() {
        let req = request(&["+100"], 4, 2);
        let mut counters = today();
        let mut rng = StdRng::seed_from_u64(3);

        let (entries, skipped) = build_schedule(&req, &mut counters, &mut rng);
        assert_eq!(entries.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(counters.count("+100"), 2);
    }

    #[test]
    fn test_normalized_rejects_inverted_delays() {
        let mut req = request(&["+100"], 1, 1);
        req.min_delay_sec = 10;
        req.max_delay_sec = 2;
        assert!(matches!(req.normalized(), Err(DialpaceError::Config(_))));

        let req = request(&[" +100 ", "", "  "], 1, 1).normalized().unwrap();
        assert_eq!(req.destinations, vec!["+100".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_mid_batch_does_not_abort() {
        let placer = Arc::new(ScriptedPlacer::failing_on(&[2]));
        let (dir, dialer) = dialer_with(placer.clone());
        let caps = DailyCapStore::new(dir.path().join("caps.json"));

        let report = run_batch(&request(&["+1", "+2", "+3"], 1, 5), &caps, &dialer)
            .await
            .unwrap();

        assert_eq!(placer.destinations(), vec!["+1", "+2", "+3"]);
        assert_eq!(report.scheduled, 3);
        assert_eq!(report.placed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].destination, "+2");
    }

    #[tokio::test]
    async fn test_quota_is_persisted_and_spent_by_failures() {
        let placer = Arc::new(ScriptedPlacer::failing_on(&[1]));
        let (dir, dialer) = dialer_with(placer.clone());
        let caps = DailyCapStore::new(dir.path().join("caps.json"));
        let req = request(&["+1"], 1, 1);

        let first = run_batch(&req, &caps, &dialer).await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(caps.load().await.unwrap().count("+1"), 1);

        let second = run_batch(&req, &caps, &dialer).await.unwrap();
        assert_eq!(second.scheduled, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(placer.destinations().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_places_nothing_but_reserves_quota() {
        let placer = Arc::new(ScriptedPlacer::default());
        let (dir, dialer) = dialer_with(placer.clone());
        let caps = DailyCapStore::new(dir.path().join("caps.json"));
        let mut req = request(&["+1", "+2"], 1, 3);
        req.dry_run = true;

        let report = run_batch(&req, &caps, &dialer).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.placed, 0);
        assert!(placer.destinations().is_empty());
        assert!(dialer.tracker().get_all().await.is_empty());
        assert_eq!(caps.load().await.unwrap().count("+2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_wait_their_delay() {
        let placer = Arc::new(ScriptedPlacer::default());
        let (_dir, dialer) = dialer_with(placer.clone());
        let req = request(&["+1", "+2"], 1, 3);
        let entries = vec![
            ScheduleEntry {
                destination: "+1".to_string(),
                round: 0,
                delay_ms: 30_000,
            },
            ScheduleEntry {
                destination: "+2".to_string(),
                round: 0,
                delay_ms: 45_000,
            },
        ];

        let started = tokio::time::Instant::now();
        let report = execute_schedule(&req, entries, 0, &dialer).await.unwrap();

        assert_eq!(report.placed, 2);
        assert!(started.elapsed() >= Duration::from_millis(75_000));
    }
}
