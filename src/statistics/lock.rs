//! Cross-process writer lock for the history log
//!
//! The lock is a sibling file created with `create_new`, holding the owner's
//! identity. Dropping the guard removes the file if it still carries the guard's
//! token. A lock older than its stale threshold is assumed abandoned and broken.

use crate::error::{StatsError, StatsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const RETRY_DELAY: Duration = Duration::from_millis(25);

/// Locks older than this are considered abandoned
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub token: String,
    pub process_id: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            process_id: std::process::id(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.acquired_at;
        age.to_std().map(|age| age > stale_after).unwrap_or(false)
    }
}

/// RAII guard for the history writer lock
#[derive(Debug)]
pub struct HistoryLock {
    path: PathBuf,
    info: LockInfo,
}

impl HistoryLock {
    /// Lock file path guarding `target`
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock, retrying until `timeout` elapses
    pub async fn acquire(
        path: PathBuf,
        timeout: Duration,
        stale_after: Duration,
    ) -> StatsResult<Self> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match Self::try_acquire(&path).await {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::break_if_stale(&path, stale_after).await {
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        let holder = match Self::read_info(&path).await {
                            Some(info) => format!(
                                "process {} on {} since {}",
                                info.process_id, info.hostname, info.acquired_at
                            ),
                            None => "an unknown holder".to_string(),
                        };
                        return Err(StatsError::lock(format!(
                            "history lock {:?} still held by {} after {:?}",
                            path, holder, timeout
                        )));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(StatsError::io(path, e)),
            }
        }
    }

    async fn try_acquire(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let info = LockInfo::new();
        let json = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
        file.write_all(&json).await?;
        file.flush().await?;

        debug!("Acquired history lock {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    /// Remove the lock file if its holder looks abandoned; true if removed
    ///
    /// The file is first moved aside and only deleted if it still holds the contents
    /// judged stale. If another process replaced it in between, it is put back.
    async fn break_if_stale(path: &Path, stale_after: Duration) -> bool {
        let observed = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(_) => return false,
        };
        let stale = match serde_json::from_slice::<LockInfo>(&observed) {
            Ok(info) => info.is_stale(stale_after),
            // Holder may still be writing its info; judge by file age instead.
            Err(_) => file_age(path)
                .await
                .is_some_and(|age| age > stale_after),
        };
        if !stale {
            return false;
        }

        let aside = path.with_extension(format!("{}.stale", Uuid::new_v4()));
        if tokio::fs::rename(path, &aside).await.is_err() {
            return false;
        }

        let moved = tokio::fs::read(&aside).await.unwrap_or_default();
        if moved == observed {
            warn!("Breaking stale history lock {:?}", path);
            let _ = tokio::fs::remove_file(&aside).await;
            return true;
        }

        debug!("History lock {:?} changed hands while breaking it", path);
        if let Err(e) = tokio::fs::hard_link(&aside, path).await {
            warn!("Failed to restore history lock {:?}: {}", path, e);
        }
        let _ = tokio::fs::remove_file(&aside).await;
        false
    }

    async fn read_info(path: &Path) -> Option<LockInfo> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Whether the lock file on disk still carries this guard's token
    fn still_held(&self) -> bool {
        std::fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LockInfo>(&bytes).ok())
            .is_some_and(|on_disk| on_disk.token == self.info.token)
    }
}

async fn file_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    modified.elapsed().ok()
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        if !self.still_held() {
            warn!(
                "History lock {:?} no longer belongs to this holder, leaving it",
                self.path
            );
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release history lock {:?}: {}", self.path, e);
        }
    }
}
