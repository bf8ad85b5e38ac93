//! Append-only JSONL log, keyed by file name

use dialpace_core::{DialpaceError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Write-mostly record log
///
/// Each key is a file under `dir`; every record is one JSON line. Lines are never
/// rewritten. Appends within this process are serialized so concurrent writers
/// cannot interleave partial lines.
pub struct MetricsLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl MetricsLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Append one record to `key`
    pub async fn append<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.path_for(key);
        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.dir).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended record to {:?}", path);
        Ok(())
    }

    /// Read every record under `key`
    ///
    /// A missing file is an empty log. Lines that fail to parse are skipped
    /// with a debug message rather than failing the whole read.
    pub async fn read_all<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| DialpaceError::Metrics(format!("reading {:?}: {}", path, e)))?;

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping unparsable line in {:?}: {}", path, e),
            }
        }

        Ok(records)
    }
}
