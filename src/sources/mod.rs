//! Read-only accessors for the data sources the statistics engine samples
//!
//! The engine only depends on the shapes these readers return. File-backed
//! implementations live in [`file`]; tests substitute their own.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub mod file;
pub mod models;

pub use file::{FileActivityReader, FileCheckpointReader, FileStateReader};
pub use models::{
    ActivityData, Branch, CheckpointEntry, CheckpointKind, CheckpointMetadata, Commit, Feature,
    Phase, PrStatus, ProjectState, PullRequest, Scheduled, Task, TaskPhase, WorkStatus,
};

/// Provides the project plan state (phases, features, tasks)
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn load_state(&self) -> Result<ProjectState>;
}

/// Provides already-loaded version-control activity
#[async_trait]
pub trait ActivityReader: Send + Sync {
    async fn load_activity(&self) -> Result<ActivityData>;
}

/// Provides checkpoint metadata
#[async_trait]
pub trait CheckpointReader: Send + Sync {
    async fn list_checkpoints(&self) -> Result<Vec<CheckpointEntry>>;
}

/// State reader that loads once and hands out the same state afterwards
///
/// The state, progress and task sources all read the project state during a single
/// collection; wrapping the reader keeps that to one load.
pub struct CachedStateReader {
    inner: Arc<dyn StateReader>,
    cell: OnceCell<ProjectState>,
}

impl CachedStateReader {
    pub fn new(inner: Arc<dyn StateReader>) -> Self {
        Self {
            inner,
            cell: OnceCell::new(),
        }
    }
}

#[async_trait]
impl StateReader for CachedStateReader {
    async fn load_state(&self) -> Result<ProjectState> {
        let state = self
            .cell
            .get_or_try_init(|| self.inner.load_state())
            .await?;
        Ok(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl StateReader for CountingReader {
        async fn load_state(&self) -> Result<ProjectState> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(ProjectState::default())
        }
    }

    struct FailingReader;

    #[async_trait]
    impl StateReader for FailingReader {
        async fn load_state(&self) -> Result<ProjectState> {
            anyhow::bail!("state file unreadable")
        }
    }

    #[tokio::test]
    async fn test_cached_reader_loads_once() {
        let inner = Arc::new(CountingReader {
            loads: AtomicUsize::new(0),
        });
        let cached = Arc::new(CachedStateReader::new(inner.clone()));

        let (a, b, c) = tokio::join!(cached.load_state(), cached.load_state(), cached.load_state());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_reader_propagates_failure() {
        let cached = CachedStateReader::new(Arc::new(FailingReader));
        let err = cached.load_state().await.unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }
}
