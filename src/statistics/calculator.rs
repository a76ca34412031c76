//! Metric derivation from a collected snapshot
//!
//! Everything here is a pure function of the snapshot, the project inputs and a
//! reference time. No I/O.

use super::types::{
    CompletionRates, PackageCoverageMetric, QualityMetrics, StatisticsData, StatisticsMetrics,
    TestingMetrics, TestingStats, TimeMetrics, VelocityMetrics,
};
use crate::sources::{ActivityData, PrStatus, ProjectState, Scheduled, WorkStatus};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Branch lifetime reported when merged PRs exist but no branch span can be derived
pub const ESTIMATED_BRANCH_LIFETIME_DAYS: f64 = 3.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Derives [`StatisticsMetrics`] from snapshots
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    project_start: Option<DateTime<Utc>>,
}

impl Calculator {
    /// Create a calculator; `None` treats the project as started today
    pub fn new(project_start: Option<DateTime<Utc>>) -> Self {
        Self { project_start }
    }

    /// Compute all metrics as of now
    pub fn calculate(
        &self,
        data: &StatisticsData,
        state: &ProjectState,
        activity: &ActivityData,
    ) -> StatisticsMetrics {
        self.calculate_at(data, state, activity, Utc::now())
    }

    /// Compute all metrics as of `now`
    pub fn calculate_at(
        &self,
        data: &StatisticsData,
        state: &ProjectState,
        activity: &ActivityData,
        now: DateTime<Utc>,
    ) -> StatisticsMetrics {
        StatisticsMetrics {
            velocity: Some(self.calculate_velocity(data, now)),
            completion: Some(self.calculate_completion_rates(data, state)),
            time: Some(self.calculate_time_metrics(data, state, now)),
            quality: Some(self.calculate_quality_metrics(data, activity, now)),
            testing: self.calculate_testing_metrics(data.testing.as_ref()),
            trends: None,
            calculated_at: now,
        }
    }

    /// Whole days elapsed since the project start, truncated; 0 without a start date
    pub fn days_since_start(&self, now: DateTime<Utc>) -> i64 {
        self.project_start
            .map(|start| (now - start).num_hours() / 24)
            .unwrap_or(0)
    }

    /// Cumulative counts divided by elapsed time
    ///
    /// Days and weeks are both floored to 1. Weekly rates divide by `days / 7` directly
    /// rather than scaling the daily rate.
    pub fn calculate_velocity(&self, data: &StatisticsData, now: DateTime<Utc>) -> VelocityMetrics {
        let days = self.days_since_start(now).max(1) as f64;
        let weeks = (days / 7.0).max(1.0);

        let mut metrics = VelocityMetrics::default();

        if let Some(state) = &data.state {
            let completed = f64::from(state.completed_features);
            metrics.features_per_day = completed / days;
            metrics.features_per_week = completed / weeks;
        }

        if let Some(github) = &data.github {
            let commits = f64::from(github.total_commits);
            metrics.commits_per_day = commits / days;
            metrics.commits_per_week = commits / weeks;
            metrics.prs_per_week = f64::from(github.merged_prs) / weeks;
        }

        if let Some(tasks) = &data.tasks {
            metrics.tasks_per_day = f64::from(tasks.completed_tasks) / days;
        }

        metrics
    }

    /// Integer-truncated completion percentages
    ///
    /// Per-phase figures are counted independently from the features and may not add
    /// up to the overall figure.
    pub fn calculate_completion_rates(
        &self,
        data: &StatisticsData,
        state: &ProjectState,
    ) -> CompletionRates {
        let mut rates = CompletionRates::default();

        if let Some(counts) = data.state.as_ref().filter(|s| s.total_features > 0) {
            rates.overall = counts.completed_features * 100 / counts.total_features;
        }

        for phase in &state.phases {
            let (total, completed) =
                state
                    .features_in_phase(&phase.id)
                    .fold((0u32, 0u32), |(total, completed), feature| {
                        let done = u32::from(feature.status == WorkStatus::Complete);
                        (total + 1, completed + done)
                    });

            if total > 0 {
                rates.phases.insert(phase.id.clone(), completed * 100 / total);
            }
        }

        rates.features = state
            .features
            .iter()
            .map(|f| (f.id.clone(), f.progress))
            .collect();

        if let Some(tasks) = &data.tasks {
            rates.tasks = tasks.completion_rate;
        }

        rates
    }

    /// Average planned durations of completed work and a naive completion estimate
    pub fn calculate_time_metrics(
        &self,
        data: &StatisticsData,
        state: &ProjectState,
        now: DateTime<Utc>,
    ) -> TimeMetrics {
        let avg_feature_time = average_completed_days(&state.features);
        let avg_phase_time = average_completed_days(&state.phases);

        let estimated_completion = data
            .state
            .as_ref()
            .map(|s| s.total_features.saturating_sub(s.completed_features))
            .filter(|remaining| avg_feature_time > 0.0 && *remaining > 0)
            .and_then(|remaining| {
                let days_remaining = (avg_feature_time * f64::from(remaining)) as i64;
                offset_days(now, days_remaining)
            });

        TimeMetrics {
            project_start_date: self.project_start,
            days_since_start: self.days_since_start(now),
            avg_feature_time,
            avg_phase_time,
            estimated_completion,
        }
    }

    pub fn calculate_quality_metrics(
        &self,
        data: &StatisticsData,
        activity: &ActivityData,
        now: DateTime<Utc>,
    ) -> QualityMetrics {
        let mut metrics = QualityMetrics::default();

        if let Some(github) = data.github.as_ref().filter(|g| g.total_prs > 0) {
            metrics.pr_merge_rate =
                f64::from(github.merged_prs) / f64::from(github.total_prs) * 100.0;
        }

        let days = self.days_since_start(now);
        if let Some(checkpoints) = data.checkpoints.as_ref().filter(|_| days > 0) {
            let weeks = days as f64 / 7.0;
            metrics.checkpoint_frequency = f64::from(checkpoints.total_checkpoints) / weeks;
        }

        if data.github.as_ref().is_some_and(|g| g.merged_prs > 0) {
            metrics.avg_branch_lifetime =
                merged_branch_lifetime(activity).unwrap_or(ESTIMATED_BRANCH_LIFETIME_DAYS);
        }

        metrics
    }

    /// Coverage percentages; `None` when there are no statements
    pub fn calculate_testing_metrics(&self, testing: Option<&TestingStats>) -> Option<TestingMetrics> {
        let testing = testing.filter(|t| t.total_statements > 0)?;

        let mut packages: Vec<PackageCoverageMetric> = testing
            .package_stats
            .values()
            .filter(|p| p.statements > 0)
            .map(|p| PackageCoverageMetric {
                name: p.name.clone(),
                coverage: percentage(p.covered_statements, p.statements),
            })
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        Some(TestingMetrics {
            overall_coverage: percentage(testing.covered_statements, testing.total_statements),
            packages,
        })
    }
}

/// `now` shifted by whole days; `None` outside the representable date range
pub(crate) fn offset_days(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|delta| now.checked_add_signed(delta))
}

fn percentage(covered: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    covered as f64 / total as f64 * 100.0
}

/// Mean planned duration of completed items with positive, parsable date ranges
fn average_completed_days<T: Scheduled>(items: &[T]) -> f64 {
    let (sum, count) = items
        .iter()
        .filter(|item| item.status() == WorkStatus::Complete)
        .filter_map(Scheduled::planned_days)
        .filter(|days| *days > 0.0)
        .fold((0.0, 0u32), |(sum, count), days| (sum + days, count + 1));

    if count == 0 {
        return 0.0;
    }
    sum / f64::from(count)
}

/// Mean first-to-last commit span of branches whose pull request was merged
fn merged_branch_lifetime(activity: &ActivityData) -> Option<f64> {
    let merged: HashSet<&str> = activity
        .prs_with_status(PrStatus::Merged)
        .map(|pr| pr.url.as_str())
        .filter(|url| !url.is_empty())
        .collect();

    let spans: Vec<f64> = activity
        .branches
        .iter()
        .filter(|b| b.has_pr && merged.contains(b.pr_url.as_str()))
        .filter_map(|branch| {
            let mut stamps = activity
                .commits
                .iter()
                .filter(|c| c.branch == branch.name)
                .chain(branch.last_commit.iter())
                .filter_map(|c| c.timestamp());

            let first = stamps.next()?;
            let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
            let span = (max - min).num_seconds() as f64 / SECONDS_PER_DAY;
            (span > 0.0).then_some(span)
        })
        .collect();

    if spans.is_empty() {
        return None;
    }
    Some(spans.iter().sum::<f64>() / spans.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Branch, Commit, Feature, Phase, PullRequest};
    use crate::statistics::types::{
        CheckpointStats, GitHubStats, PackageCoverageStats, StateData, TaskStats,
    };
    use std::collections::BTreeMap;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn snapshot() -> StatisticsData {
        StatisticsData::new(at("2024-03-01T00:00:00Z"))
    }

    fn feature(id: &str, phase: &str, status: WorkStatus) -> Feature {
        Feature {
            id: id.to_string(),
            phase: phase.to_string(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_overall_completion_truncates() {
        let mut data = snapshot();
        data.state = Some(StateData {
            total_features: 10,
            completed_features: 6,
            ..Default::default()
        });
        let calc = Calculator::new(None);
        let rates = calc.calculate_completion_rates(&data, &ProjectState::default());
        assert_eq!(rates.overall, 60);

        data.state = Some(StateData {
            total_features: 3,
            completed_features: 2,
            ..Default::default()
        });
        let rates = calc.calculate_completion_rates(&data, &ProjectState::default());
        assert_eq!(rates.overall, 66);
    }

    #[test]
    fn test_phase_and_feature_completion() {
        let mut f1 = feature("f1", "p1", WorkStatus::Complete);
        f1.progress = 100;
        let mut f2 = feature("f2", "p1", WorkStatus::InProgress);
        f2.progress = 30;
        let state = ProjectState {
            phases: vec![
                Phase {
                    id: "p1".to_string(),
                    ..Default::default()
                },
                Phase {
                    id: "empty".to_string(),
                    ..Default::default()
                },
            ],
            features: vec![f1, f2, feature("f3", "p1", WorkStatus::Pending)],
            ..Default::default()
        };
        let mut data = snapshot();
        data.tasks = Some(TaskStats {
            completion_rate: 75,
            ..Default::default()
        });

        let rates = Calculator::new(None).calculate_completion_rates(&data, &state);
        assert_eq!(rates.phases["p1"], 33);
        assert!(!rates.phases.contains_key("empty"));
        assert_eq!(rates.features["f1"], 100);
        assert_eq!(rates.features["f2"], 30);
        assert_eq!(rates.tasks, 75);
        assert_eq!(rates.overall, 0);
    }

    #[test]
    fn test_velocity_on_day_one_is_finite() {
        let now = at("2024-03-01T12:00:00Z");
        let calc = Calculator::new(Some(now));
        let mut data = snapshot();
        data.state = Some(StateData {
            completed_features: 3,
            ..Default::default()
        });
        data.github = Some(GitHubStats {
            total_commits: 14,
            merged_prs: 2,
            ..Default::default()
        });

        let velocity = calc.calculate_velocity(&data, now);
        assert_eq!(velocity.features_per_day, 3.0);
        assert_eq!(velocity.commits_per_day, 14.0);
        assert!(velocity.features_per_week.is_finite());
        assert!(!velocity.prs_per_week.is_nan());
    }

    #[test]
    fn test_velocity_rates() {
        let start = at("2024-01-01T00:00:00Z");
        let now = at("2024-01-15T00:00:00Z");
        let mut data = snapshot();
        data.state = Some(StateData {
            completed_features: 7,
            ..Default::default()
        });
        data.github = Some(GitHubStats {
            total_commits: 28,
            merged_prs: 4,
            ..Default::default()
        });
        data.tasks = Some(TaskStats {
            completed_tasks: 21,
            ..Default::default()
        });

        let velocity = Calculator::new(Some(start)).calculate_velocity(&data, now);
        assert_eq!(velocity.features_per_day, 0.5);
        assert_eq!(velocity.features_per_week, 3.5);
        assert_eq!(velocity.commits_per_day, 2.0);
        assert_eq!(velocity.commits_per_week, 14.0);
        assert_eq!(velocity.tasks_per_day, 1.5);
        assert_eq!(velocity.prs_per_week, 2.0);
    }

    #[test]
    fn test_velocity_skips_absent_sources() {
        let velocity = Calculator::new(None).calculate_velocity(&snapshot(), Utc::now());
        assert_eq!(velocity, VelocityMetrics::default());
    }

    #[test]
    fn test_time_metrics_excludes_unparsable_dates() {
        let mut done = feature("f1", "p1", WorkStatus::Complete);
        done.start_date = "2024-01-01".to_string();
        done.target_date = "2024-01-05".to_string();
        let mut done2 = feature("f2", "p1", WorkStatus::Complete);
        done2.start_date = "2024-01-01".to_string();
        done2.target_date = "2024-01-03".to_string();
        let mut undated = feature("f3", "p1", WorkStatus::Complete);
        undated.start_date = "someday".to_string();
        undated.target_date = "2024-01-03".to_string();
        let mut open = feature("f4", "p1", WorkStatus::InProgress);
        open.start_date = "2024-01-01".to_string();
        open.target_date = "2024-03-01".to_string();

        let state = ProjectState {
            phases: vec![Phase {
                id: "p1".to_string(),
                status: WorkStatus::Complete,
                start_date: "2024-01-01".to_string(),
                target_date: "2024-01-15".to_string(),
                ..Default::default()
            }],
            features: vec![done, done2, undated, open],
            ..Default::default()
        };
        let mut data = snapshot();
        data.state = Some(StateData {
            total_features: 4,
            completed_features: 3,
            ..Default::default()
        });
        let now = at("2024-03-01T00:00:00Z");

        let time = Calculator::new(Some(at("2024-01-01T00:00:00Z")))
            .calculate_time_metrics(&data, &state, now);
        assert_eq!(time.avg_feature_time, 3.0);
        assert_eq!(time.avg_phase_time, 14.0);
        assert_eq!(time.days_since_start, 60);
        assert_eq!(time.estimated_completion, Some(at("2024-03-04T00:00:00Z")));
    }

    #[test]
    fn test_estimate_beyond_date_range_is_absent() {
        let mut done = feature("f1", "p1", WorkStatus::Complete);
        done.start_date = "0001-01-01".to_string();
        done.target_date = "9999-12-31".to_string();
        let state = ProjectState {
            features: vec![done],
            ..Default::default()
        };
        let mut data = snapshot();
        data.state = Some(StateData {
            total_features: 101,
            completed_features: 1,
            ..Default::default()
        });
        let now = at("2024-03-01T00:00:00Z");

        let calc = Calculator::new(None);
        let time = calc.calculate_time_metrics(&data, &state, now);
        assert!(time.avg_feature_time > 3_000_000.0);
        assert!(time.estimated_completion.is_none());

        let metrics = calc.calculate_at(&data, &state, &ActivityData::default(), now);
        assert!(metrics.time.unwrap().estimated_completion.is_none());
    }

    #[test]
    fn test_offset_days_bounds() {
        let now = at("2024-03-01T00:00:00Z");
        assert_eq!(offset_days(now, 3), Some(at("2024-03-04T00:00:00Z")));
        assert!(offset_days(now, i64::MAX).is_none());
        assert!(offset_days(DateTime::<Utc>::MAX_UTC, 1).is_none());
    }

    #[test]
    fn test_no_estimate_without_feature_durations() {
        let mut data = snapshot();
        data.state = Some(StateData {
            total_features: 4,
            completed_features: 1,
            ..Default::default()
        });
        let time = Calculator::new(None).calculate_time_metrics(
            &data,
            &ProjectState::default(),
            Utc::now(),
        );
        assert_eq!(time.avg_feature_time, 0.0);
        assert!(time.estimated_completion.is_none());
    }

    #[test]
    fn test_quality_metrics() {
        let start = at("2024-01-01T00:00:00Z");
        let now = at("2024-01-15T00:00:00Z");
        let mut data = snapshot();
        data.github = Some(GitHubStats {
            total_prs: 4,
            merged_prs: 3,
            ..Default::default()
        });
        data.checkpoints = Some(CheckpointStats {
            total_checkpoints: 6,
            ..Default::default()
        });

        let quality = Calculator::new(Some(start)).calculate_quality_metrics(
            &data,
            &ActivityData::default(),
            now,
        );
        assert_eq!(quality.pr_merge_rate, 75.0);
        assert_eq!(quality.checkpoint_frequency, 3.0);
        assert_eq!(quality.avg_branch_lifetime, ESTIMATED_BRANCH_LIFETIME_DAYS);
        assert_eq!(quality.avg_pr_review_time, 0.0);
    }

    #[test]
    fn test_branch_lifetime_zero_without_merged_prs() {
        let mut data = snapshot();
        data.github = Some(GitHubStats {
            total_prs: 2,
            open_prs: 2,
            ..Default::default()
        });
        let quality =
            Calculator::new(None).calculate_quality_metrics(&data, &ActivityData::default(), Utc::now());
        assert_eq!(quality.avg_branch_lifetime, 0.0);
        assert_eq!(quality.pr_merge_rate, 0.0);
        assert_eq!(quality.checkpoint_frequency, 0.0);
    }

    #[test]
    fn test_branch_lifetime_from_commits() {
        let url = "https://example.com/pr/7";
        let commit = |date: &str| Commit {
            branch: "feature/login".to_string(),
            date: date.to_string(),
            ..Default::default()
        };
        let activity = ActivityData {
            branches: vec![Branch {
                name: "feature/login".to_string(),
                has_pr: true,
                pr_url: url.to_string(),
                ..Default::default()
            }],
            commits: vec![
                commit("2024-01-01 09:00:00 +0000"),
                commit("2024-01-03T09:00:00Z"),
                commit("not a date"),
            ],
            prs: vec![PullRequest {
                url: url.to_string(),
                status: PrStatus::Merged,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut data = snapshot();
        data.github = Some(GitHubStats {
            total_prs: 1,
            merged_prs: 1,
            ..Default::default()
        });

        let quality = Calculator::new(None).calculate_quality_metrics(&data, &activity, Utc::now());
        assert_eq!(quality.avg_branch_lifetime, 2.0);
    }

    #[test]
    fn test_testing_metrics_sorted_by_package() {
        let mut package_stats = BTreeMap::new();
        for (name, statements, covered) in [("zeta", 4, 1), ("alpha", 2, 2), ("empty", 0, 0)] {
            package_stats.insert(
                name.to_string(),
                PackageCoverageStats {
                    name: name.to_string(),
                    statements,
                    covered_statements: covered,
                },
            );
        }
        let testing = TestingStats {
            total_statements: 6,
            covered_statements: 3,
            package_stats,
        };

        let metrics = Calculator::new(None)
            .calculate_testing_metrics(Some(&testing))
            .unwrap();
        assert_eq!(metrics.overall_coverage, 50.0);
        let names: Vec<_> = metrics.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(metrics.packages[1].coverage, 25.0);
    }

    #[test]
    fn test_testing_metrics_absent_without_statements() {
        let calc = Calculator::new(None);
        assert!(calc.calculate_testing_metrics(None).is_none());
        assert!(calc
            .calculate_testing_metrics(Some(&TestingStats::default()))
            .is_none());
    }

    #[test]
    fn test_calculate_is_deterministic() {
        let now = at("2024-02-01T00:00:00Z");
        let calc = Calculator::new(Some(at("2024-01-01T00:00:00Z")));
        let mut data = snapshot();
        data.state = Some(StateData {
            total_features: 5,
            completed_features: 2,
            ..Default::default()
        });

        let a = calc.calculate_at(&data, &ProjectState::default(), &ActivityData::default(), now);
        let b = calc.calculate_at(&data, &ProjectState::default(), &ActivityData::default(), now);
        assert_eq!(a, b);
        assert_eq!(a.calculated_at, now);
        assert!(a.trends.is_none());
    }
}
