//! Append-only history log of derived snapshots
//!
//! The log is a single JSON array of [`HistoricalData`], capped to the most recent
//! `retention` entries. Every save rewrites the whole file, so saves are serialized:
//! an in-process mutex orders writers sharing a `HistoryStorage`, and a lock file
//! orders writers across processes. The rewrite goes through a temp file and a rename.

use super::lock::{HistoryLock, DEFAULT_STALE_AFTER};
use super::types::{HistoricalData, StatisticsData, StatisticsMetrics};
use crate::config::{StatsConfig, DEFAULT_RETENTION};
use crate::error::{StatsError, StatsResult};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Owner of the on-disk history log
#[derive(Debug, Clone)]
pub struct HistoryStorage {
    path: PathBuf,
    retention: usize,
    lock_timeout: Duration,
    writer: Arc<Mutex<()>>,
}

impl HistoryStorage {
    /// Storage at `path` with the default retention cap
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention: DEFAULT_RETENTION,
            lock_timeout: Duration::from_secs(10),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::new(config.resolved_history_path())
            .with_retention(config.retention)
            .with_lock_timeout(config.lock_timeout)
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a snapshot stamped with the current time
    ///
    /// Trends attached to `metrics` are not persisted.
    pub async fn save(
        &self,
        metrics: &StatisticsMetrics,
        data: &StatisticsData,
    ) -> StatsResult<HistoricalData> {
        let mut metrics = metrics.clone();
        metrics.trends = None;

        let entry = HistoricalData {
            timestamp: Utc::now(),
            metrics,
            data: data.clone(),
        };
        self.append(entry.clone()).await?;
        Ok(entry)
    }

    /// Append a prepared entry, evicting the oldest beyond the retention cap
    pub async fn append(&self, entry: HistoricalData) -> StatsResult<()> {
        let _writer = self.writer.lock().await;
        self.ensure_directory().await?;
        let _lock = self.acquire_file_lock().await?;

        let mut history = self.load_all().await?;
        history.push(entry);

        if history.len() > self.retention {
            let evicted = history.len() - self.retention;
            history.drain(..evicted);
            debug!("Evicted {} old statistics entries", evicted);
        }

        self.write_atomically(&history).await?;
        debug!(
            "Saved statistics history with {} entries to {:?}",
            history.len(),
            self.path
        );
        Ok(())
    }

    /// Every stored entry, oldest first; empty when the log does not exist
    pub async fn load_all(&self) -> StatsResult<Vec<HistoricalData>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StatsError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StatsError::serialization(format!("corrupt history log {:?}: {}", self.path, e))
        })
    }

    /// Entries with `timestamp >= since`
    pub async fn load_since(&self, since: DateTime<Utc>) -> StatsResult<Vec<HistoricalData>> {
        let all = self.load_all().await?;
        Ok(all.into_iter().filter(|e| e.timestamp >= since).collect())
    }

    /// Entries with `start <= timestamp <= end`
    pub async fn load_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StatsResult<Vec<HistoricalData>> {
        let all = self.load_all().await?;
        Ok(all
            .into_iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }

    /// Most recent entry; [`StatsError::NoData`] on an empty log
    pub async fn get_latest(&self) -> StatsResult<HistoricalData> {
        self.load_all()
            .await?
            .pop()
            .ok_or(StatsError::NoData)
    }

    /// Delete the log; a missing log is not an error
    pub async fn clear(&self) -> StatsResult<()> {
        let _writer = self.writer.lock().await;
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|e| StatsError::io(&self.path, e))?;
        if !exists {
            return Ok(());
        }
        let _lock = self.acquire_file_lock().await?;

        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Cleared statistics history {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StatsError::io(&self.path, e)),
        }
    }

    async fn ensure_directory(&self) -> StatsResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StatsError::io(dir, e))?;
        }
        Ok(())
    }

    async fn acquire_file_lock(&self) -> StatsResult<HistoryLock> {
        HistoryLock::acquire(
            HistoryLock::lock_path_for(&self.path),
            self.lock_timeout,
            DEFAULT_STALE_AFTER,
        )
        .await
    }

    async fn write_atomically(&self, history: &[HistoricalData]) -> StatsResult<()> {
        let content = serde_json::to_string_pretty(history)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "statistics.json".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&temp_path, content)
            .await
            .map_err(|e| StatsError::io(&temp_path, e))?;

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StatsError::io(&self.path, e));
        }
        Ok(())
    }
}
