pub mod db;
pub mod ingest;
pub mod service;
pub mod trend;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

// ============================================================================
// Data model
// ============================================================================

/// Lighthouse sub-scores, each 0-100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LighthouseScores {
    pub performance: Option<i64>,
    pub accessibility: Option<i64>,
    pub best_practices: Option<i64>,
    pub seo: Option<i64>,
    pub pwa: Option<i64>,
}

impl LighthouseScores {
    pub fn present(&self) -> Vec<i64> {
        [
            self.performance,
            self.accessibility,
            self.best_practices,
            self.seo,
            self.pwa,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreWebVitals {
    pub lcp_ms: Option<i64>,
    pub fid_ms: Option<i64>,
    /// Cumulative layout shift scaled by 1000.
    pub cls: Option<i64>,
}

/// Counts for one test suite. `coverage` is a percentage scaled by 100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuiteResult {
    pub total: Option<i64>,
    pub passed: Option<i64>,
    pub failed: Option<i64>,
    pub coverage: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResults {
    pub unit: SuiteResult,
    pub integration: SuiteResult,
    pub e2e: SuiteResult,
}

impl TestResults {
    pub fn suites(&self) -> [(&'static str, &SuiteResult); 3] {
        [
            ("unit", &self.unit),
            ("integration", &self.integration),
            ("e2e", &self.e2e),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceMetrics {
    pub bundle_size: Option<i64>,
    pub load_time: Option<i64>,
    pub ttfb: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilityMetrics {
    pub wcag_score: Option<i64>,
    pub axe_violations: Option<i64>,
}

/// What a CI run submits: identity plus whichever signals its tooling produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub commit_hash: String,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub lighthouse: LighthouseScores,
    #[serde(default)]
    pub web_vitals: CoreWebVitals,
    #[serde(default)]
    pub tests: TestResults,
    #[serde(default)]
    pub performance: PerformanceMetrics,
    #[serde(default)]
    pub accessibility: AccessibilityMetrics,
}

/// A stored snapshot. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: String,
    #[serde(flatten)]
    pub snapshot: MetricSnapshot,
    pub created_at: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn new(
        commit_hash: impl Into<String>,
        branch: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            branch: branch.into(),
            timestamp,
            lighthouse: LighthouseScores::default(),
            web_vitals: CoreWebVitals::default(),
            tests: TestResults::default(),
            performance: PerformanceMetrics::default(),
            accessibility: AccessibilityMetrics::default(),
        }
    }

    /// Checks an inbound payload before it is saved. The service never calls
    /// this; it is applied at the ingest surfaces.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.commit_hash.trim().is_empty() {
            return Err(MetricsError::InvalidRecord("commitHash must not be empty".into()));
        }
        if self.branch.trim().is_empty() {
            return Err(MetricsError::InvalidRecord("branch must not be empty".into()));
        }
        // Stored timestamps are four-digit-year RFC 3339 text.
        let year = self.timestamp.year();
        if !(0..=9999).contains(&year) {
            return Err(MetricsError::InvalidRecord(format!(
                "timestamp year must be within 0..=9999, got {}",
                year
            )));
        }

        let lh = &self.lighthouse;
        let scores = [
            ("lighthouse.performance", lh.performance),
            ("lighthouse.accessibility", lh.accessibility),
            ("lighthouse.bestPractices", lh.best_practices),
            ("lighthouse.seo", lh.seo),
            ("lighthouse.pwa", lh.pwa),
            ("accessibility.wcagScore", self.accessibility.wcag_score),
        ];
        for (name, value) in scores {
            check_range(name, value, 0, 100)?;
        }

        let non_negative = [
            ("webVitals.lcpMs", self.web_vitals.lcp_ms),
            ("webVitals.fidMs", self.web_vitals.fid_ms),
            ("webVitals.cls", self.web_vitals.cls),
            ("performance.bundleSize", self.performance.bundle_size),
            ("performance.loadTime", self.performance.load_time),
            ("performance.ttfb", self.performance.ttfb),
            ("accessibility.axeViolations", self.accessibility.axe_violations),
        ];
        for (name, value) in non_negative {
            check_range(name, value, 0, i64::MAX)?;
        }

        for (suite, result) in self.tests.suites() {
            for (field, value) in [
                ("total", result.total),
                ("passed", result.passed),
                ("failed", result.failed),
                ("coverage", result.coverage),
            ] {
                check_range(&format!("tests.{}.{}", suite, field), value, 0, i64::MAX)?;
            }
            if let Some(total) = result.total {
                for (field, value) in [("passed", result.passed), ("failed", result.failed)] {
                    if value.is_some_and(|v| v > total) {
                        return Err(MetricsError::InvalidRecord(format!(
                            "tests.{}.{} exceeds total ({})",
                            suite, field, total
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn check_range(name: &str, value: Option<i64>, min: i64, max: i64) -> Result<(), MetricsError> {
    match value {
        Some(v) if v < min || v > max => Err(MetricsError::InvalidRecord(if max == i64::MAX {
            format!("{} must be non-negative, got {}", name, v)
        } else {
            format!("{} must be within {}..={}, got {}", name, min, max, v)
        })),
        _ => Ok(()),
    }
}
