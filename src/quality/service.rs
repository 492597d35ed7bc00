use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::db::{MetricsDb, MetricsQuery};
use super::trend::{compare_records, round2, Trend, TrendDirection};
use super::MetricRecord;
use crate::config::{MissingValuePolicy, HISTORY_LIMIT, STATISTICS_WINDOW};
use crate::error::MetricsError;

// ============================================================================
// Result types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub latest: Option<MetricRecord>,
    pub trends: Vec<Trend>,
    pub history: Vec<MetricRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendsCount {
    pub improving: u32,
    pub declining: u32,
    pub stable: u32,
}

impl TrendsCount {
    pub fn tally(trends: &[Trend]) -> Self {
        let mut count = TrendsCount::default();
        for trend in trends {
            match trend.trend {
                TrendDirection::Up => count.improving += 1,
                TrendDirection::Down => count.declining += 1,
                TrendDirection::Stable => count.stable += 1,
            }
        }
        count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub average_lighthouse_score: i64,
    pub test_success_rate: f64,
    pub average_load_time: f64,
    pub trends_count: TrendsCount,
}

// ============================================================================
// Service
// ============================================================================

/// Latest/trend/statistics views over the metrics store.
///
/// Holds nothing but the store handle, so it is cheap to clone per request.
/// Storage failures propagate unchanged; absence of data is `None`, an empty
/// list, or zero.
#[derive(Clone)]
pub struct QualityMetricsService {
    db: Arc<MetricsDb>,
    load_time_policy: MissingValuePolicy,
}

impl QualityMetricsService {
    pub fn new(db: Arc<MetricsDb>) -> Self {
        Self {
            db,
            load_time_policy: MissingValuePolicy::default(),
        }
    }

    pub fn with_load_time_policy(mut self, policy: MissingValuePolicy) -> Self {
        self.load_time_policy = policy;
        self
    }

    pub fn db(&self) -> &MetricsDb {
        &self.db
    }

    pub fn get_latest(&self, branch: Option<&str>) -> Result<Option<MetricRecord>, MetricsError> {
        let mut rows = self.db.query(&MetricsQuery::recent(branch, 1))?;
        Ok(rows.pop())
    }

    /// Compares the newest record with the one right before it. Both come
    /// from a single statement, so a concurrent insert cannot split the pair.
    pub fn get_trends(&self, branch: Option<&str>) -> Result<Vec<Trend>, MetricsError> {
        let recent = self.db.query(&MetricsQuery::recent(branch, 2))?;
        let trends = match recent.as_slice() {
            [current, previous, ..] => compare_records(current, previous),
            _ => Vec::new(),
        };
        debug!(
            "Computed {} trends for branch {:?}",
            trends.len(),
            branch.unwrap_or("*")
        );
        Ok(trends)
    }

    /// Each field is read independently; a save landing between the reads can
    /// make `latest` and `history` disagree.
    pub fn get_dashboard_overview(
        &self,
        branch: Option<&str>,
    ) -> Result<DashboardOverview, MetricsError> {
        let latest = self.get_latest(branch)?;
        let trends = self.get_trends(branch)?;
        let history = self.db.query(&MetricsQuery::recent(branch, HISTORY_LIMIT))?;
        Ok(DashboardOverview {
            latest,
            trends,
            history,
        })
    }

    pub fn get_statistics(&self, branch: Option<&str>) -> Result<Statistics, MetricsError> {
        let window = self.db.query(&MetricsQuery::recent(branch, STATISTICS_WINDOW))?;
        if window.is_empty() {
            return Ok(Statistics {
                average_lighthouse_score: 0,
                test_success_rate: 0.0,
                average_load_time: 0.0,
                trends_count: TrendsCount::default(),
            });
        }

        let trends = self.get_trends(branch)?;
        Ok(Statistics {
            average_lighthouse_score: average_lighthouse_score(&window),
            test_success_rate: test_success_rate(&window),
            average_load_time: average_load_time(&window, self.load_time_policy),
            trends_count: TrendsCount::tally(&trends),
        })
    }
}

// ============================================================================
// Aggregates
// ============================================================================

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of each record's present Lighthouse sub-scores, averaged across
/// records. Records with no sub-scores at all are left out.
pub fn average_lighthouse_score(records: &[MetricRecord]) -> i64 {
    let per_record: Vec<f64> = records
        .iter()
        .filter_map(|r| {
            let scores = r.snapshot.lighthouse.present();
            if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<i64>() as f64 / scores.len() as f64)
            }
        })
        .collect();
    mean(&per_record).round() as i64
}

/// Passed over total across all suites, per record, as a percentage.
/// A record with no tests counts as 100. Suite counts are summed in `i128`
/// so that three `i64` counts cannot overflow.
pub fn test_success_rate(records: &[MetricRecord]) -> f64 {
    let per_record: Vec<f64> = records
        .iter()
        .map(|r| {
            let (passed, total) = r
                .snapshot
                .tests
                .suites()
                .iter()
                .fold((0i128, 0i128), |(p, t), (_, suite)| {
                    (
                        p + i128::from(suite.passed.unwrap_or(0)),
                        t + i128::from(suite.total.unwrap_or(0)),
                    )
                });
            if total == 0 {
                100.0
            } else {
                passed as f64 / total as f64 * 100.0
            }
        })
        .collect();
    round2(mean(&per_record))
}

pub fn average_load_time(records: &[MetricRecord], policy: MissingValuePolicy) -> f64 {
    let values: Vec<f64> = match policy {
        MissingValuePolicy::Skip => records
            .iter()
            .filter_map(|r| r.snapshot.performance.load_time)
            .map(|v| v as f64)
            .collect(),
        MissingValuePolicy::Zero => records
            .iter()
            .map(|r| r.snapshot.performance.load_time.unwrap_or(0) as f64)
            .collect(),
    };
    round2(mean(&values))
}
