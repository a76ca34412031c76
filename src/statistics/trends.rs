//! Trend classification against the stored history
//!
//! Each metric family (velocity, completion, quality) is compared with its own
//! baseline: the newest entry older than a week, or failing that the oldest entry
//! that carries the family at all. With fewer than two history entries, or no
//! baseline, the trend is stable with zero change.

use super::calculator::offset_days;
use super::types::{
    CompletionRates, HistoricalData, QualityMetrics, StatisticsMetrics, TrendDirection, Trends,
    VelocityMetrics,
};
use chrono::{DateTime, Utc};

/// How far back the preferred baseline must lie
pub const BASELINE_AGE_DAYS: i64 = 7;

/// Percent change in features per day beyond which velocity is trending
pub const VELOCITY_THRESHOLD_PERCENT: f64 = 10.0;

/// Percentage-point change in overall completion beyond which completion is trending
pub const COMPLETION_THRESHOLD_POINTS: f64 = 5.0;

/// Percentage-point change in PR merge rate beyond which quality is trending
pub const QUALITY_THRESHOLD_POINTS: f64 = 5.0;

/// Window used for the projection's average velocity
const PROJECTION_WINDOW_DAYS: i64 = 7;

/// Compares current metrics with history
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendCalculator;

impl TrendCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Classify every metric family as of now
    pub fn calculate_trends(
        &self,
        current: &StatisticsMetrics,
        history: &[HistoricalData],
    ) -> Trends {
        self.calculate_trends_at(current, history, Utc::now())
    }

    /// Classify every metric family as of `now`
    pub fn calculate_trends_at(
        &self,
        current: &StatisticsMetrics,
        history: &[HistoricalData],
        now: DateTime<Utc>,
    ) -> Trends {
        let mut trends = Trends {
            projected_completion: self.calculate_projection_at(current, history, now),
            ..Trends::default()
        };

        if history.is_empty() {
            return trends;
        }

        if let Some(velocity) = &current.velocity {
            (trends.velocity_trend, trends.velocity_change) =
                self.velocity_trend(velocity, history, now);
        }
        if let Some(completion) = &current.completion {
            (trends.completion_trend, trends.completion_change) =
                self.completion_trend(completion, history, now);
        }
        if let Some(quality) = &current.quality {
            trends.quality_trend = self.quality_trend(quality, history, now);
        }

        trends
    }

    /// Percent change in features per day against the velocity baseline
    pub fn velocity_trend(
        &self,
        current: &VelocityMetrics,
        history: &[HistoricalData],
        now: DateTime<Utc>,
    ) -> (TrendDirection, f64) {
        let Some(previous) = baseline(history, now, |m| m.velocity.as_ref()) else {
            return (TrendDirection::Stable, 0.0);
        };

        let current_rate = current.features_per_day;
        let previous_rate = previous.features_per_day;

        if previous_rate == 0.0 {
            if current_rate > 0.0 {
                return (TrendDirection::Improving, 100.0);
            }
            return (TrendDirection::Stable, 0.0);
        }

        let change = (current_rate - previous_rate) / previous_rate * 100.0;
        (classify(change, VELOCITY_THRESHOLD_PERCENT), change)
    }

    /// Percentage-point change in overall completion against the completion baseline
    pub fn completion_trend(
        &self,
        current: &CompletionRates,
        history: &[HistoricalData],
        now: DateTime<Utc>,
    ) -> (TrendDirection, f64) {
        let Some(previous) = baseline(history, now, |m| m.completion.as_ref()) else {
            return (TrendDirection::Stable, 0.0);
        };

        let change = f64::from(current.overall) - f64::from(previous.overall);
        (classify(change, COMPLETION_THRESHOLD_POINTS), change)
    }

    /// Direction of the PR merge rate against the quality baseline
    pub fn quality_trend(
        &self,
        current: &QualityMetrics,
        history: &[HistoricalData],
        now: DateTime<Utc>,
    ) -> TrendDirection {
        let Some(previous) = baseline(history, now, |m| m.quality.as_ref()) else {
            return TrendDirection::Stable;
        };

        let change = current.pr_merge_rate - previous.pr_merge_rate;
        classify(change, QUALITY_THRESHOLD_POINTS)
    }

    /// Mean of every velocity field over entries newer than `days` ago
    ///
    /// Zero-valued when no entry falls in the window.
    pub fn calculate_average_velocity(
        &self,
        history: &[HistoricalData],
        days: i64,
    ) -> VelocityMetrics {
        self.calculate_average_velocity_at(history, days, Utc::now())
    }

    pub fn calculate_average_velocity_at(
        &self,
        history: &[HistoricalData],
        days: i64,
        now: DateTime<Utc>,
    ) -> VelocityMetrics {
        let cutoff = offset_days(now, days.saturating_neg()).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let window: Vec<&VelocityMetrics> = history
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .filter_map(|e| e.metrics.velocity.as_ref())
            .collect();

        if window.is_empty() {
            return VelocityMetrics::default();
        }

        let n = window.len() as f64;
        let mean =
            |field: fn(&VelocityMetrics) -> f64| window.iter().map(|v| field(v)).sum::<f64>() / n;

        VelocityMetrics {
            features_per_day: mean(|v| v.features_per_day),
            features_per_week: mean(|v| v.features_per_week),
            commits_per_day: mean(|v| v.commits_per_day),
            commits_per_week: mean(|v| v.commits_per_week),
            tasks_per_day: mean(|v| v.tasks_per_day),
            prs_per_week: mean(|v| v.prs_per_week),
        }
    }

    /// Rough completion date extrapolated from recent velocity
    ///
    /// Remaining completion points divided by ten times the features-per-day rate.
    /// This is a coarse heuristic, not a forecast. `None` when velocity or completion
    /// is missing or the estimate is not a finite, non-negative number of days.
    pub fn calculate_projection(
        &self,
        current: &StatisticsMetrics,
        history: &[HistoricalData],
    ) -> Option<DateTime<Utc>> {
        self.calculate_projection_at(current, history, Utc::now())
    }

    pub fn calculate_projection_at(
        &self,
        current: &StatisticsMetrics,
        history: &[HistoricalData],
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let (velocity, completion) = (current.velocity.as_ref()?, current.completion.as_ref()?);

        let average = self.calculate_average_velocity_at(history, PROJECTION_WINDOW_DAYS, now);
        let features_per_day = if average.features_per_day == 0.0 {
            velocity.features_per_day
        } else {
            average.features_per_day
        };

        let remaining = 100.0 - f64::from(completion.overall);
        if remaining <= 0.0 {
            return Some(now);
        }

        let days_remaining = remaining / (features_per_day * 10.0);
        if !days_remaining.is_finite() || days_remaining < 0.0 {
            return None;
        }

        offset_days(now, days_remaining as i64)
    }
}

/// Baseline selection shared by all families
///
/// First pass, newest to oldest: the first entry older than the cutoff that has the
/// family. Second pass, oldest to newest: the first entry that has it at all.
fn baseline<'a, T>(
    history: &'a [HistoricalData],
    now: DateTime<Utc>,
    family: impl Fn(&'a StatisticsMetrics) -> Option<&'a T>,
) -> Option<&'a T> {
    if history.len() < 2 {
        return None;
    }

    let cutoff = offset_days(now, -BASELINE_AGE_DAYS).unwrap_or(DateTime::<Utc>::MIN_UTC);
    history
        .iter()
        .rev()
        .filter(|e| e.timestamp < cutoff)
        .find_map(|e| family(&e.metrics))
        .or_else(|| history.iter().find_map(|e| family(&e.metrics)))
}

fn classify(change: f64, threshold: f64) -> TrendDirection {
    if change > threshold {
        TrendDirection::Improving
    } else if change < -threshold {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}
