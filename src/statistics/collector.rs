//! Snapshot collection across all sources
//!
//! The six sources (state, activity, checkpoints, progress, tasks, coverage) are
//! fetched as independent tasks and joined. A source that fails, panics or misses its
//! deadline leaves its sub-record absent; collection itself never fails.

use super::coverage;
use super::types::{
    CheckpointStats, GitHubStats, ProgressHistory, StateData, StatisticsData, TaskStats,
    TestingStats,
};
use crate::config::StatsConfig;
use crate::error::StatsError;
use crate::sources::{
    ActivityData, ActivityReader, CachedStateReader, CheckpointEntry, CheckpointKind,
    CheckpointReader, FileActivityReader, FileCheckpointReader, FileStateReader, PrStatus,
    ProjectState, StateReader, WorkStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one collection cycle
///
/// Besides the snapshot, carries the project state and activity the snapshot was
/// derived from, so calculation works on the same inputs.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub data: StatisticsData,
    pub state: Option<ProjectState>,
    pub activity: Option<ActivityData>,
}

/// Gathers one [`StatisticsData`] snapshot from every source
pub struct Collector {
    state_reader: Arc<dyn StateReader>,
    activity_reader: Arc<dyn ActivityReader>,
    checkpoint_reader: Arc<dyn CheckpointReader>,
    project_root: PathBuf,
    coverage_paths: Vec<PathBuf>,
    source_timeout: Duration,
}

impl Collector {
    /// Create a collector reading the conventional files under the configured root
    pub fn new(config: &StatsConfig) -> Self {
        let root = &config.project_root;
        Self {
            state_reader: Arc::new(FileStateReader::new(root.clone())),
            activity_reader: Arc::new(FileActivityReader::new(root)),
            checkpoint_reader: Arc::new(FileCheckpointReader::new(root)),
            project_root: root.clone(),
            coverage_paths: config.coverage_paths.clone(),
            source_timeout: config.source_timeout,
        }
    }

    pub fn with_state_reader(mut self, reader: Arc<dyn StateReader>) -> Self {
        self.state_reader = reader;
        self
    }

    pub fn with_activity_reader(mut self, reader: Arc<dyn ActivityReader>) -> Self {
        self.activity_reader = reader;
        self
    }

    pub fn with_checkpoint_reader(mut self, reader: Arc<dyn CheckpointReader>) -> Self {
        self.checkpoint_reader = reader;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Collect a snapshot from all sources concurrently
    pub async fn collect(&self) -> StatisticsData {
        self.collect_with_inputs().await.data
    }

    /// Collect a snapshot and keep the inputs it was derived from
    pub async fn collect_with_inputs(&self) -> CollectionOutcome {
        let collected_at = Utc::now();
        let timeout = self.source_timeout;
        debug!("Collecting statistics from {:?}", self.project_root);

        // One state load per cycle, shared by the three state-derived sources.
        let state_reader: Arc<dyn StateReader> =
            Arc::new(CachedStateReader::new(self.state_reader.clone()));

        let state_task = {
            let reader = state_reader.clone();
            async move {
                let state = reader.load_state().await?;
                Ok::<_, anyhow::Error>((state_stats(&state), state))
            }
        };
        let github_task = {
            let reader = self.activity_reader.clone();
            async move {
                let activity = reader.load_activity().await?;
                Ok::<_, anyhow::Error>((github_stats(&activity), activity))
            }
        };
        let checkpoint_task = {
            let reader = self.checkpoint_reader.clone();
            async move {
                let entries = reader.list_checkpoints().await?;
                Ok::<_, anyhow::Error>(checkpoint_stats(&entries))
            }
        };
        let progress_task = {
            let reader = state_reader.clone();
            async move {
                let state = reader.load_state().await?;
                Ok::<_, anyhow::Error>(progress_history(&state, Utc::now()))
            }
        };
        let task_task = {
            let reader = state_reader;
            async move {
                let state = reader.load_state().await?;
                Ok::<_, anyhow::Error>(task_stats(&state))
            }
        };
        let testing_task = {
            let root = self.project_root.clone();
            let paths = self.coverage_paths.clone();
            async move { collect_testing(root, paths).await }
        };

        let (state, github, checkpoints, progress, tasks, testing) = tokio::join!(
            run_source("state", timeout, state_task),
            run_source("github", timeout, github_task),
            run_source("checkpoints", timeout, checkpoint_task),
            run_source("progress", timeout, progress_task),
            run_source("tasks", timeout, task_task),
            run_source("testing", timeout, testing_task),
        );

        let (state_data, project_state) = state.unzip();
        let (github_data, activity) = github.unzip();

        let data = StatisticsData {
            state: state_data,
            github: github_data,
            checkpoints,
            progress,
            tasks,
            testing: testing.flatten(),
            collected_at,
        };

        info!(
            "Collected statistics snapshot ({} of 6 sources present)",
            present_sources(&data)
        );

        CollectionOutcome {
            data,
            state: project_state,
            activity,
        }
    }
}

/// Run one source fetch as its own task, bounded by `timeout`
///
/// Every failure mode is logged and mapped to `None`.
async fn run_source<T, F>(name: &'static str, timeout: Duration, fetch: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(fetch);

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(value))) => Some(value),
        Ok(Ok(Err(e))) => {
            warn!(source = name, "Statistics source unavailable: {:#}", e);
            None
        }
        Ok(Err(join_error)) => {
            warn!(source = name, "Statistics source task failed: {}", join_error);
            None
        }
        Err(_) => {
            handle.abort();
            let err = StatsError::SourceTimeout {
                source_name: name.to_string(),
                timeout,
            };
            warn!(source = name, "{}", err);
            None
        }
    }
}

fn present_sources(data: &StatisticsData) -> usize {
    [
        data.state.is_some(),
        data.github.is_some(),
        data.checkpoints.is_some(),
        data.progress.is_some(),
        data.tasks.is_some(),
        data.testing.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count()
}

/// Count phases and features by status
pub fn state_stats(state: &ProjectState) -> StateData {
    let mut data = StateData {
        total_phases: state.phases.len() as u32,
        total_features: state.features.len() as u32,
        completed_phases: state
            .phases
            .iter()
            .filter(|p| p.status == WorkStatus::Complete)
            .count() as u32,
        ..Default::default()
    };

    for feature in &state.features {
        match feature.status {
            WorkStatus::Complete => data.completed_features += 1,
            WorkStatus::InProgress => data.in_progress_features += 1,
            WorkStatus::Pending => data.pending_features += 1,
            WorkStatus::Other => {}
        }
    }

    data
}

/// Count branches, commits and pull requests
pub fn github_stats(activity: &ActivityData) -> GitHubStats {
    let mut stats = GitHubStats {
        total_branches: activity.branches.len() as u32,
        total_commits: activity.commits.len() as u32,
        total_prs: activity.prs.len() as u32,
        active_branches: activity
            .branches
            .iter()
            .filter(|b| b.commit_count > 0)
            .count() as u32,
        ..Default::default()
    };

    for pr in &activity.prs {
        match pr.status {
            PrStatus::Merged => stats.merged_prs += 1,
            PrStatus::Open => stats.open_prs += 1,
            PrStatus::Closed => stats.closed_prs += 1,
            PrStatus::Other => {}
        }
    }

    stats
}

/// Count checkpoints by kind and find the most recent one
pub fn checkpoint_stats(entries: &[CheckpointEntry]) -> CheckpointStats {
    let mut stats = CheckpointStats {
        total_checkpoints: entries.len() as u32,
        ..Default::default()
    };

    for metadata in entries.iter().filter_map(|e| e.metadata.as_ref()) {
        match metadata.kind {
            CheckpointKind::Manual => stats.manual_checkpoints += 1,
            CheckpointKind::Feature => stats.feature_checkpoints += 1,
            CheckpointKind::Phase => stats.phase_checkpoints += 1,
            CheckpointKind::Other => {}
        }
        if stats
            .last_checkpoint
            .map_or(true, |last| metadata.created_at > last)
        {
            stats.last_checkpoint = Some(metadata.created_at);
        }
    }

    stats
}

/// Copy progress figures out of the project state
pub fn progress_history(state: &ProjectState, now: DateTime<Utc>) -> ProgressHistory {
    ProgressHistory {
        overall_progress: state.progress.overall,
        phase_progress: state
            .progress
            .phases
            .iter()
            .map(|(id, progress)| (id.clone(), *progress))
            .collect(),
        feature_progress: state
            .features
            .iter()
            .map(|f| (f.id.clone(), f.progress))
            .collect(),
        last_updated: now,
    }
}

/// Count tasks across all features
pub fn task_stats(state: &ProjectState) -> TaskStats {
    let mut stats = TaskStats::default();

    for task in state.tasks() {
        stats.total_tasks += 1;
        if task.completed {
            stats.completed_tasks += 1;
        } else {
            stats.pending_tasks += 1;
        }
    }

    if stats.total_tasks > 0 {
        stats.completion_rate = stats.completed_tasks * 100 / stats.total_tasks;
    }

    stats
}

/// Parse the first coverage profile found; `None` when there is none or it is empty
pub async fn collect_testing(
    project_root: PathBuf,
    candidates: Vec<PathBuf>,
) -> Result<Option<TestingStats>> {
    let Some(path) = coverage::locate_profile(&project_root, &candidates) else {
        debug!("No coverage profile under {:?}", project_root);
        return Ok(None);
    };

    let content = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read coverage profile {:?}", path))?;

    coverage::read_profile(content.as_slice())
        .with_context(|| format!("Failed to parse coverage profile {:?}", path))
}
