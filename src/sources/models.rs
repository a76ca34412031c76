//! Input shapes produced by the project-state, activity and checkpoint sources

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Date format used for phase and feature planning dates
pub const PLAN_DATE_FORMAT: &str = "%Y-%m-%d";

/// Commit date format emitted by `git log --date=iso`
const GIT_ISO_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Lifecycle status of a phase or feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkStatus {
    Complete,
    InProgress,
    #[default]
    Pending,
    /// Any status string not recognised above
    #[serde(other)]
    Other,
}

/// Status of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Merged,
    #[default]
    Open,
    Closed,
    #[serde(other)]
    Other,
}

/// Kind of checkpoint recorded in checkpoint metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Manual,
    Feature,
    Phase,
    #[serde(other)]
    Other,
}

/// The full project plan state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectState {
    pub phases: Vec<Phase>,
    pub features: Vec<Feature>,
    pub progress: Progress,
}

impl ProjectState {
    /// Features belonging to the given phase
    pub fn features_in_phase<'a>(&'a self, phase_id: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features.iter().filter(move |f| f.phase == phase_id)
    }

    /// All tasks across every feature and task phase
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.features
            .iter()
            .flat_map(|f| f.task_phases.iter())
            .flat_map(|tp| tp.tasks.iter())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub status: WorkStatus,
    pub start_date: String,
    pub target_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    pub id: String,
    pub phase: String,
    pub name: String,
    pub status: WorkStatus,
    pub progress: i32,
    pub branch: String,
    pub task_phases: Vec<TaskPhase>,
    pub start_date: String,
    pub target_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPhase {
    pub name: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub name: String,
    pub completed: bool,
}

/// Progress figures recorded in the project state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub overall: i32,
    pub phases: HashMap<String, i32>,
}

/// Something with a planned start and target date
pub trait Scheduled {
    fn status(&self) -> WorkStatus;
    fn start_date(&self) -> &str;
    fn target_date(&self) -> &str;

    /// Planned duration in days, if both dates parse
    fn planned_days(&self) -> Option<f64> {
        let start = parse_plan_date(self.start_date())?;
        let target = parse_plan_date(self.target_date())?;
        Some((target - start).num_hours() as f64 / 24.0)
    }
}

impl Scheduled for Phase {
    fn status(&self) -> WorkStatus {
        self.status
    }
    fn start_date(&self) -> &str {
        &self.start_date
    }
    fn target_date(&self) -> &str {
        &self.target_date
    }
}

impl Scheduled for Feature {
    fn status(&self) -> WorkStatus {
        self.status
    }
    fn start_date(&self) -> &str {
        &self.start_date
    }
    fn target_date(&self) -> &str {
        &self.target_date
    }
}

/// Parse a `YYYY-MM-DD` planning date
pub fn parse_plan_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, PLAN_DATE_FORMAT).ok()
}

/// Version-control activity as loaded by the activity source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityData {
    pub branches: Vec<Branch>,
    pub commits: Vec<Commit>,
    pub prs: Vec<PullRequest>,
    pub pushes: Vec<Push>,
}

impl ActivityData {
    /// Pull requests in the given status
    pub fn prs_with_status(&self, status: PrStatus) -> impl Iterator<Item = &PullRequest> {
        self.prs.iter().filter(move |pr| pr.status == status)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branch {
    pub name: String,
    pub status: String,
    pub ahead_count: i32,
    pub behind_count: i32,
    pub commit_count: i32,
    pub last_commit: Option<Commit>,
    #[serde(rename = "hasPR")]
    pub has_pr: bool,
    #[serde(rename = "prUrl")]
    pub pr_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub branch: String,
    pub pr_url: String,
}

impl Commit {
    /// Commit timestamp, accepting RFC 3339 or git's ISO-like format
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.trim();
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, GIT_ISO_DATE_FORMAT))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub url: String,
    pub status: PrStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Push {
    pub branch: String,
    pub status: String,
    pub commit_count: i32,
    pub timestamp: String,
}

/// Metadata stored alongside each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    #[serde(rename = "type")]
    pub kind: CheckpointKind,
    pub created_at: DateTime<Utc>,
}

/// One checkpoint as seen by the checkpoint source
///
/// `metadata` is `None` when the checkpoint's metadata was missing or unreadable; such
/// checkpoints still count towards the total.
#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub id: String,
    pub metadata: Option<CheckpointMetadata>,
}
