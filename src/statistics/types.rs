//! Data model for collected snapshots, derived metrics and stored history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw point-in-time snapshot of every source
///
/// Each sub-record is `None` when its source failed or was unavailable. `None` is not
/// the same as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsData {
    pub state: Option<StateData>,
    pub github: Option<GitHubStats>,
    pub checkpoints: Option<CheckpointStats>,
    pub progress: Option<ProgressHistory>,
    pub tasks: Option<TaskStats>,
    pub testing: Option<TestingStats>,
    pub collected_at: DateTime<Utc>,
}

impl StatisticsData {
    /// An empty snapshot stamped with the given collection time
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            state: None,
            github: None,
            checkpoints: None,
            progress: None,
            tasks: None,
            testing: None,
            collected_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub total_phases: u32,
    pub total_features: u32,
    pub completed_phases: u32,
    pub completed_features: u32,
    pub in_progress_features: u32,
    pub pending_features: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStats {
    pub total_branches: u32,
    pub total_commits: u32,
    #[serde(rename = "totalPRs")]
    pub total_prs: u32,
    #[serde(rename = "mergedPRs")]
    pub merged_prs: u32,
    #[serde(rename = "openPRs")]
    pub open_prs: u32,
    #[serde(rename = "closedPRs")]
    pub closed_prs: u32,
    pub active_branches: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStats {
    pub total_checkpoints: u32,
    pub manual_checkpoints: u32,
    pub feature_checkpoints: u32,
    pub phase_checkpoints: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressHistory {
    pub overall_progress: i32,
    pub phase_progress: BTreeMap<String, i32>,
    pub feature_progress: BTreeMap<String, i32>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub pending_tasks: u32,
    /// Integer percentage, truncated
    pub completion_rate: u32,
}

/// Statement coverage totals parsed from a coverage profile
///
/// Counts are in source statements, not lines. `covered_statements <= total_statements`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingStats {
    pub total_statements: u64,
    pub covered_statements: u64,
    pub package_stats: BTreeMap<String, PackageCoverageStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCoverageStats {
    pub name: String,
    pub statements: u64,
    pub covered_statements: u64,
}

/// Metrics derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsMetrics {
    pub velocity: Option<VelocityMetrics>,
    pub completion: Option<CompletionRates>,
    pub time: Option<TimeMetrics>,
    pub quality: Option<QualityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing: Option<TestingMetrics>,
    /// Attached at read time; never written to the history log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<Trends>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityMetrics {
    pub features_per_day: f64,
    pub features_per_week: f64,
    pub commits_per_day: f64,
    pub commits_per_week: f64,
    pub tasks_per_day: f64,
    #[serde(rename = "prsPerWeek")]
    pub prs_per_week: f64,
}

/// Completion percentages, integer-truncated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRates {
    pub overall: u32,
    pub phases: BTreeMap<String, u32>,
    pub features: BTreeMap<String, i32>,
    pub tasks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeMetrics {
    pub project_start_date: Option<DateTime<Utc>>,
    pub days_since_start: i64,
    /// Days
    pub avg_feature_time: f64,
    /// Days
    pub avg_phase_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Hours
    #[serde(rename = "avgPRReviewTime")]
    pub avg_pr_review_time: f64,
    /// Percentage
    #[serde(rename = "prMergeRate")]
    pub pr_merge_rate: f64,
    /// Days
    pub avg_branch_lifetime: f64,
    /// Per week
    pub checkpoint_frequency: f64,
}

/// Direction of a metric family relative to its baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    #[default]
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub velocity_trend: TrendDirection,
    pub completion_trend: TrendDirection,
    pub quality_trend: TrendDirection,
    /// Percent change in features per day
    pub velocity_change: f64,
    /// Percentage-point change in overall completion
    pub completion_change: f64,
    /// Rough extrapolation, not a forecast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingMetrics {
    pub overall_coverage: f64,
    pub packages: Vec<PackageCoverageMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageCoverageMetric {
    pub name: String,
    pub coverage: f64,
}

/// One entry of the history log
///
/// `timestamp` is assigned when the entry is saved, independent of
/// `metrics.calculated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    pub timestamp: DateTime<Utc>,
    pub metrics: StatisticsMetrics,
    pub data: StatisticsData,
}
