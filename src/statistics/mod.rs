//! Project health statistics
//!
//! Periodic snapshots of project activity are collected from the project sources,
//! turned into derived metrics, kept in a bounded history log and compared against
//! that history to classify trends.
//!
//! [`StatisticsEngine`] wires the pieces into one collection cycle.

use crate::config::StatsConfig;
use crate::error::{StatsError, StatsResult};
use tracing::{debug, info};

pub mod calculator;
pub mod collector;
pub mod coverage;
pub mod lock;
pub mod storage;
pub mod trends;
pub mod types;

pub use calculator::Calculator;
pub use collector::{CollectionOutcome, Collector};
pub use storage::HistoryStorage;
pub use trends::TrendCalculator;
pub use types::{
    CheckpointStats, CompletionRates, GitHubStats, HistoricalData, PackageCoverageMetric,
    PackageCoverageStats, ProgressHistory, QualityMetrics, StateData, StatisticsData,
    StatisticsMetrics, TaskStats, TestingMetrics, TestingStats, TimeMetrics, TrendDirection,
    Trends, VelocityMetrics,
};

/// One project's collection pipeline
pub struct StatisticsEngine {
    collector: Collector,
    calculator: Calculator,
    storage: HistoryStorage,
    trends: TrendCalculator,
}

impl StatisticsEngine {
    /// Build the engine for the configured project
    pub fn new(config: &StatsConfig) -> Self {
        Self::from_parts(
            Collector::new(config),
            Calculator::new(config.resolve_project_start()),
            HistoryStorage::from_config(config),
        )
    }

    pub fn from_parts(collector: Collector, calculator: Calculator, storage: HistoryStorage) -> Self {
        Self {
            collector,
            calculator,
            storage,
            trends: TrendCalculator::new(),
        }
    }

    pub fn storage(&self) -> &HistoryStorage {
        &self.storage
    }

    /// Run one full cycle and record it in the history
    pub async fn run(&self) -> StatsResult<StatisticsMetrics> {
        self.run_with(true).await
    }

    /// Collect, calculate and compare against history, optionally saving the result
    ///
    /// Trends are computed against the history as it stood before this run. They are
    /// attached to the returned metrics but never written to the log.
    pub async fn run_with(&self, save: bool) -> StatsResult<StatisticsMetrics> {
        let outcome = self.collector.collect_with_inputs().await;
        let state = outcome.state.unwrap_or_default();
        let activity = outcome.activity.unwrap_or_default();

        let mut metrics = self.calculator.calculate(&outcome.data, &state, &activity);

        let history = self.storage.load_all().await?;
        let trends = self
            .trends
            .calculate_trends_at(&metrics, &history, metrics.calculated_at);
        debug!(
            "Trends against {} stored snapshots: velocity {}, completion {}, quality {}",
            history.len(),
            trends.velocity_trend,
            trends.completion_trend,
            trends.quality_trend
        );

        if save {
            self.storage.save(&metrics, &outcome.data).await?;
            info!("Recorded statistics snapshot in {:?}", self.storage.path());
        }

        metrics.trends = Some(trends);
        Ok(metrics)
    }

    /// Trends of the newest stored entry against the entries before it
    pub async fn trends(&self) -> StatsResult<Trends> {
        let history = self.storage.load_all().await?;
        let (latest, previous) = history.split_last().ok_or(StatsError::NoData)?;
        Ok(self
            .trends
            .calculate_trends_at(&latest.metrics, previous, latest.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{
        ActivityData, ActivityReader, CheckpointEntry, CheckpointReader, Feature, ProjectState,
        StateReader, WorkStatus,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixedState(ProjectState);

    #[async_trait]
    impl StateReader for FixedState {
        async fn load_state(&self) -> Result<ProjectState> {
            Ok(self.0.clone())
        }
    }

    struct NoActivity;

    #[async_trait]
    impl ActivityReader for NoActivity {
        async fn load_activity(&self) -> Result<ActivityData> {
            Ok(ActivityData::default())
        }
    }

    struct NoCheckpoints;

    #[async_trait]
    impl CheckpointReader for NoCheckpoints {
        async fn list_checkpoints(&self) -> Result<Vec<CheckpointEntry>> {
            Ok(Vec::new())
        }
    }

    fn feature(id: &str, status: WorkStatus) -> Feature {
        Feature {
            id: id.to_string(),
            phase: "p1".to_string(),
            status,
            ..Default::default()
        }
    }

    fn engine(temp_dir: &TempDir, completed: usize) -> StatisticsEngine {
        let features = (0..4)
            .map(|i| {
                let status = if i < completed {
                    WorkStatus::Complete
                } else {
                    WorkStatus::Pending
                };
                feature(&format!("f{i}"), status)
            })
            .collect();
        let state = ProjectState {
            features,
            ..Default::default()
        };

        let config = StatsConfig::new(temp_dir.path())
            .with_project_start(Utc::now() - Duration::days(10));
        let collector = Collector::new(&config)
            .with_state_reader(Arc::new(FixedState(state)))
            .with_activity_reader(Arc::new(NoActivity))
            .with_checkpoint_reader(Arc::new(NoCheckpoints));

        StatisticsEngine::from_parts(
            collector,
            Calculator::new(config.resolve_project_start()),
            HistoryStorage::from_config(&config),
        )
    }

    #[tokio::test]
    async fn test_run_saves_without_trends() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, 2);

        let metrics = engine.run().await.unwrap();
        assert!(metrics.trends.is_some());
        let completion = metrics.completion.as_ref().unwrap();
        assert_eq!(completion.overall, 50);
        assert_eq!(completion.features.len(), 4);

        let stored = engine.storage().load_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].metrics.trends.is_none());
        assert!(stored[0].data.state.is_some());
    }

    #[tokio::test]
    async fn test_run_without_save_leaves_history_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, 1);

        engine.run_with(false).await.unwrap();
        assert!(engine.storage().load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_run_trends_are_stable() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, 3);

        let trends = engine.run().await.unwrap().trends.unwrap();
        assert_eq!(trends.velocity_trend, TrendDirection::Stable);
        assert_eq!(trends.completion_trend, TrendDirection::Stable);
        assert_eq!(trends.quality_trend, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn test_stored_trends_need_history() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, 0);

        let err = engine.trends().await.unwrap_err();
        assert!(err.is_no_data());

        engine.run().await.unwrap();
        engine.run().await.unwrap();
        let trends = engine.trends().await.unwrap();
        assert_eq!(trends.velocity_trend, TrendDirection::Stable);
        assert_eq!(trends.velocity_change, 0.0);
    }

    #[tokio::test]
    async fn test_corrupt_history_fails_the_run() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, 0);
        let path = engine.storage().path().to_path_buf();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, StatsError::Serialization(_)));
    }
}
