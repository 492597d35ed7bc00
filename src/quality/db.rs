use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{
    AccessibilityMetrics, CoreWebVitals, LighthouseScores, MetricRecord, MetricSnapshot,
    PerformanceMetrics, SuiteResult, TestResults,
};
use crate::config::{DEFAULT_DB_FILENAME, DEFAULT_QUERY_LIMIT};
use crate::error::MetricsError;

// ============================================================================
// Query parameters
// ============================================================================

/// Inclusive timestamp window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub branch: Option<String>,
    pub date_range: Option<DateRange>,
    /// Defaults to `DEFAULT_QUERY_LIMIT` when unset.
    pub limit: Option<usize>,
}

impl MetricsQuery {
    pub fn recent(branch: Option<&str>, limit: usize) -> Self {
        Self {
            branch: branch.map(str::to_string),
            date_range: None,
            limit: Some(limit),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

const RECORD_COLUMNS: &str = "id, commit_hash, branch, timestamp,
    lighthouse_performance, lighthouse_accessibility, lighthouse_best_practices, lighthouse_seo, lighthouse_pwa,
    lcp_ms, fid_ms, cls,
    test_unit_total, test_unit_passed, test_unit_failed, test_unit_coverage,
    test_integration_total, test_integration_passed, test_integration_failed, test_integration_coverage,
    test_e2e_total, test_e2e_passed, test_e2e_failed, test_e2e_coverage,
    bundle_size, load_time, ttfb,
    wcag_score, axe_violations,
    created_at";

/// Append-only SQLite store of per-run quality snapshots.
pub struct MetricsDb {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl MetricsDb {
    pub fn open(db_path: &Path) -> Result<Self, MetricsError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        db.init_schema()?;
        tracing::debug!("Opened metrics database at {:?}", db_path);
        Ok(db)
    }

    /// Opens `quality-metrics.db` inside `dir`.
    pub fn open_in(dir: &Path) -> Result<Self, MetricsError> {
        Self::open(&dir.join(DEFAULT_DB_FILENAME))
    }

    pub fn in_memory() -> Result<Self, MetricsError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Saves run inside a transaction, so a poisoned lock never guards
        // half-applied state.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<(), MetricsError> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS quality_metrics (
                id TEXT PRIMARY KEY,
                commit_hash TEXT NOT NULL,
                branch TEXT NOT NULL,
                timestamp TEXT NOT NULL,

                lighthouse_performance INTEGER,
                lighthouse_accessibility INTEGER,
                lighthouse_best_practices INTEGER,
                lighthouse_seo INTEGER,
                lighthouse_pwa INTEGER,

                lcp_ms INTEGER,
                fid_ms INTEGER,
                cls INTEGER,

                test_unit_total INTEGER,
                test_unit_passed INTEGER,
                test_unit_failed INTEGER,
                test_unit_coverage INTEGER,
                test_integration_total INTEGER,
                test_integration_passed INTEGER,
                test_integration_failed INTEGER,
                test_integration_coverage INTEGER,
                test_e2e_total INTEGER,
                test_e2e_passed INTEGER,
                test_e2e_failed INTEGER,
                test_e2e_coverage INTEGER,

                bundle_size INTEGER,
                load_time INTEGER,
                ttfb INTEGER,

                wcag_score INTEGER,
                axe_violations INTEGER,

                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_qm_timestamp ON quality_metrics(timestamp);
            CREATE INDEX IF NOT EXISTS idx_qm_branch_timestamp ON quality_metrics(branch, timestamp);
            CREATE INDEX IF NOT EXISTS idx_qm_commit ON quality_metrics(commit_hash);
        ",
        )?;
        Ok(())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts one snapshot and returns the row as stored. The insert is
    /// rolled back if the row cannot be read back.
    pub fn save(&self, snapshot: &MetricSnapshot) -> Result<MetricRecord, MetricsError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = format_ts(&Utc::now());
        let s = snapshot;
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO quality_metrics ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30)"
            ),
            params![
                id,
                s.commit_hash,
                s.branch,
                format_ts(&s.timestamp),
                s.lighthouse.performance,
                s.lighthouse.accessibility,
                s.lighthouse.best_practices,
                s.lighthouse.seo,
                s.lighthouse.pwa,
                s.web_vitals.lcp_ms,
                s.web_vitals.fid_ms,
                s.web_vitals.cls,
                s.tests.unit.total,
                s.tests.unit.passed,
                s.tests.unit.failed,
                s.tests.unit.coverage,
                s.tests.integration.total,
                s.tests.integration.passed,
                s.tests.integration.failed,
                s.tests.integration.coverage,
                s.tests.e2e.total,
                s.tests.e2e.passed,
                s.tests.e2e.failed,
                s.tests.e2e.coverage,
                s.performance.bundle_size,
                s.performance.load_time,
                s.performance.ttfb,
                s.accessibility.wcag_score,
                s.accessibility.axe_violations,
                created_at,
            ],
        )?;

        let stored = tx.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM quality_metrics WHERE id = ?1"),
            params![id],
            row_to_record,
        )?;
        tx.commit()?;
        tracing::info!(
            "Saved metrics {} for {}@{}",
            stored.id,
            stored.snapshot.branch,
            stored.snapshot.commit_hash
        );
        Ok(stored)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: &str) -> Result<Option<MetricRecord>, MetricsError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM quality_metrics WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Newest first. Rows sharing a timestamp are returned latest-inserted first.
    pub fn query(&self, filter: &MetricsQuery) -> Result<Vec<MetricRecord>, MetricsError> {
        let (where_clause, params) = build_where_clause(filter);
        let limit = i64::try_from(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT)).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM quality_metrics{where_clause}
             ORDER BY timestamp DESC, rowid DESC LIMIT {limit}"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        bind_params(&mut stmt, &params)?;
        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        tracing::debug!("Metrics query {:?} returned {} rows", filter, records.len());
        Ok(records)
    }

    pub fn count(&self, branch: Option<&str>) -> Result<u64, MetricsError> {
        let conn = self.conn();
        let count: i64 = match branch {
            Some(branch) => conn.query_row(
                "SELECT COUNT(*) FROM quality_metrics WHERE branch = ?1",
                params![branch],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM quality_metrics", [], |row| row.get(0))?,
        };
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Fixed-width UTC text so that lexicographic order is chronological order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn suite_at(row: &Row<'_>, first: usize) -> rusqlite::Result<SuiteResult> {
    Ok(SuiteResult {
        total: row.get(first)?,
        passed: row.get(first + 1)?,
        failed: row.get(first + 2)?,
        coverage: row.get(first + 3)?,
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord {
        id: row.get(0)?,
        snapshot: MetricSnapshot {
            commit_hash: row.get(1)?,
            branch: row.get(2)?,
            timestamp: parse_ts(row, 3)?,
            lighthouse: LighthouseScores {
                performance: row.get(4)?,
                accessibility: row.get(5)?,
                best_practices: row.get(6)?,
                seo: row.get(7)?,
                pwa: row.get(8)?,
            },
            web_vitals: CoreWebVitals {
                lcp_ms: row.get(9)?,
                fid_ms: row.get(10)?,
                cls: row.get(11)?,
            },
            tests: TestResults {
                unit: suite_at(row, 12)?,
                integration: suite_at(row, 16)?,
                e2e: suite_at(row, 20)?,
            },
            performance: PerformanceMetrics {
                bundle_size: row.get(24)?,
                load_time: row.get(25)?,
                ttfb: row.get(26)?,
            },
            accessibility: AccessibilityMetrics {
                wcag_score: row.get(27)?,
                axe_violations: row.get(28)?,
            },
        },
        created_at: parse_ts(row, 29)?,
    })
}

/// Exact-branch and inclusive timestamp conditions, numbered from `?1`. The
/// range bounds are bound in stored text form.
fn build_where_clause(filter: &MetricsQuery) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(ref branch) = filter.branch {
        params.push(branch.clone());
        conditions.push(format!("branch = ?{}", params.len()));
    }
    if let Some(range) = filter.date_range {
        params.push(format_ts(&range.start));
        conditions.push(format!("timestamp >= ?{}", params.len()));
        params.push(format_ts(&range.end));
        conditions.push(format!("timestamp <= ?{}", params.len()));
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[String]) -> rusqlite::Result<()> {
    for (i, param) in params.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, param)?;
    }
    Ok(())
}
