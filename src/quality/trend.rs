use serde::{Deserialize, Serialize};

use super::MetricRecord;

/// Relative change, in percent, beyond which a metric counts as moving.
pub const TREND_THRESHOLD_PERCENT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn from_change_percent(change_percent: f64) -> Self {
        if change_percent > TREND_THRESHOLD_PERCENT {
            TrendDirection::Up
        } else if change_percent < -TREND_THRESHOLD_PERCENT {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            TrendDirection::Up => TrendDirection::Down,
            TrendDirection::Down => TrendDirection::Up,
            TrendDirection::Stable => TrendDirection::Stable,
        }
    }
}

/// The metrics compared between consecutive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedMetric {
    LighthousePerformance,
    TestCoverage,
    BundleSize,
    LoadTime,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [
        TrackedMetric::LighthousePerformance,
        TrackedMetric::TestCoverage,
        TrackedMetric::BundleSize,
        TrackedMetric::LoadTime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TrackedMetric::LighthousePerformance => "Lighthouse Performance",
            TrackedMetric::TestCoverage => "Test Coverage",
            TrackedMetric::BundleSize => "Bundle Size",
            TrackedMetric::LoadTime => "Load Time",
        }
    }

    /// Smaller is better for these, so a numeric drop reads as "up".
    pub fn lower_is_better(self) -> bool {
        matches!(self, TrackedMetric::BundleSize | TrackedMetric::LoadTime)
    }

    pub fn value(self, record: &MetricRecord) -> Option<i64> {
        let s = &record.snapshot;
        match self {
            TrackedMetric::LighthousePerformance => s.lighthouse.performance,
            TrackedMetric::TestCoverage => s.tests.unit.coverage,
            TrackedMetric::BundleSize => s.performance.bundle_size,
            TrackedMetric::LoadTime => s.performance.load_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub metric: String,
    pub current: i64,
    pub previous: i64,
    pub change: i64,
    /// Rounded to 2 decimals; classification uses the unrounded value.
    pub change_percent: f64,
    pub trend: TrendDirection,
}

impl Trend {
    pub fn compute(metric: TrackedMetric, current: i64, previous: i64) -> Self {
        let change = current - previous;
        let change_percent = if previous == 0 {
            0.0
        } else {
            change as f64 / previous as f64 * 100.0
        };
        let mut direction = TrendDirection::from_change_percent(change_percent);
        if metric.lower_is_better() {
            direction = direction.inverted();
        }
        Trend {
            metric: metric.label().to_string(),
            current,
            previous,
            change,
            change_percent: round2(change_percent),
            trend: direction,
        }
    }
}

/// Trends for every tracked metric present in both records.
pub fn compare_records(current: &MetricRecord, previous: &MetricRecord) -> Vec<Trend> {
    TrackedMetric::ALL
        .iter()
        .filter_map(|&metric| match (metric.value(current), metric.value(previous)) {
            (Some(cur), Some(prev)) => Some(Trend::compute(metric, cur, prev)),
            _ => None,
        })
        .collect()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
