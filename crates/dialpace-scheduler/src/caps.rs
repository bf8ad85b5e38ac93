//! Per-number daily call caps
//!
//! One JSON snapshot `{ "date": "YYYY-MM-DD", "counts": { "<number>": n } }`,
//! overwritten whole on every save. A snapshot from another day reads as empty,
//! so the reset happens lazily on first use each day.
//!
//! Within a process, [`DailyCapStore::reserve`] holds a lock across
//! load, update and save, so concurrent batches see each other's reservations.
//! There is no cross-process locking: one scheduling process owns the file.

use chrono::{Local, NaiveDate};
use dialpace_core::{DialpaceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Call counts for a single calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounters {
    pub date: NaiveDate,
    #[serde(default)]
    pub counts: BTreeMap<String, u32>,
}

impl DailyCounters {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            counts: BTreeMap::new(),
        }
    }

    pub fn count(&self, number: &str) -> u32 {
        self.counts.get(number).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, number: &str) -> u32 {
        let count = self.counts.entry(number.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// File-backed daily cap store
pub struct DailyCapStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DailyCapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load today's counters, let `f` update them, and save the result
    ///
    /// The whole sequence runs under the store lock.
    pub async fn reserve<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DailyCounters) -> T,
    {
        self.reserve_for(Local::now().date_naive(), f).await
    }

    /// [`reserve`](Self::reserve) for an explicit date
    pub async fn reserve_for<T, F>(&self, today: NaiveDate, f: F) -> Result<T>
    where
        F: FnOnce(&mut DailyCounters) -> T,
    {
        let _guard = self.lock.lock().await;
        let mut counters = self.load_for(today).await?;
        let out = f(&mut counters);
        self.write_snapshot(&counters).await?;
        Ok(out)
    }

    /// Counters for today (local calendar date)
    pub async fn load(&self) -> Result<DailyCounters> {
        self.load_for(Local::now().date_naive()).await
    }

    /// Counters for `today`; anything stored for another date is discarded
    pub async fn load_for(&self, today: NaiveDate) -> Result<DailyCounters> {
        if !self.path.exists() {
            return Ok(DailyCounters::empty(today));
        }

        let content = fs::read_to_string(&self.path).await?;
        let stored: DailyCounters = serde_json::from_str(&content).map_err(|e| {
            DialpaceError::CapStore(format!("Failed to parse {:?}: {}", self.path, e))
        })?;

        if stored.date != today {
            info!(
                "Daily caps from {} are stale, starting fresh for {}",
                stored.date, today
            );
            return Ok(DailyCounters::empty(today));
        }

        Ok(stored)
    }

    /// Replace the snapshot
    ///
    /// Writes a sibling temp file and renames it over the old one, so readers see
    /// either the previous snapshot or the new one.
    pub async fn save(&self, counters: &DailyCounters) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_snapshot(counters).await
    }

    async fn write_snapshot(&self, counters: &DailyCounters) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(counters)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(
            "Saved daily caps for {} ({} numbers) to {:?}",
            counters.date,
            counters.counts.len(),
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_today() {
        let dir = tempdir().unwrap();
        let store = DailyCapStore::new(dir.path().join("caps.json"));

        let counters = store.load_for(day(1)).await.unwrap();
        assert_eq!(counters, DailyCounters::empty(day(1)));
    }

    #[tokio::test]
    async fn test_save_then_load_same_day() {
        let dir = tempdir().unwrap();
        let store = DailyCapStore::new(dir.path().join("state").join("caps.json"));

        let mut counters = DailyCounters::empty(day(1));
        counters.increment("+100");
        counters.increment("+100");
        counters.increment("+200");
        store.save(&counters).await.unwrap();

        let loaded = store.load_for(day(1)).await.unwrap();
        assert_eq!(loaded.count("+100"), 2);
        assert_eq!(loaded.count("+200"), 1);
        assert_eq!(loaded.count("+300"), 0);
        assert!(!dir.path().join("state").join("caps.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_stale_date_resets() {
        let dir = tempdir().unwrap();
        let store = DailyCapStore::new(dir.path().join("caps.json"));

        let mut counters = DailyCounters::empty(day(1));
        counters.increment("+100");
        store.save(&counters).await.unwrap();

        let loaded = store.load_for(day(2)).await.unwrap();
        assert_eq!(loaded.date, day(2));
        assert!(loaded.counts.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        let store = DailyCapStore::new(&path);

        let mut counters = DailyCounters::empty(day(9));
        counters.increment("+100");
        store.save(&counters).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["date"], "2024-06-09");
        assert_eq!(raw["counts"]["+100"], 1);
    }

    #[tokio::test]
    async fn test_reserve_persists_update() {
        let dir = tempdir().unwrap();
        let store = DailyCapStore::new(dir.path().join("caps.json"));

        let n = store
            .reserve_for(day(3), |c| c.increment("+100"))
            .await
            .unwrap();
        assert_eq!(n, 1);

        let n = store
            .reserve_for(day(3), |c| c.increment("+100"))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.load_for(day(3)).await.unwrap().count("+100"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_all_land() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(DailyCapStore::new(dir.path().join("caps.json")));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.reserve_for(day(4), |c| c.increment("+100")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.load_for(day(4)).await.unwrap().count("+100"), 8);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = DailyCapStore::new(&path);
        assert!(matches!(
            store.load_for(day(1)).await,
            Err(DialpaceError::CapStore(_))
        ));
    }
}
