use std::path::Path;

use super::db::MetricsDb;
use super::{MetricRecord, MetricSnapshot};
use crate::error::MetricsError;

/// Reads and validates a CI payload file without saving it.
pub fn load_snapshot(path: &Path) -> Result<MetricSnapshot, MetricsError> {
    let content = std::fs::read_to_string(path)?;
    let snapshot: MetricSnapshot = serde_json::from_str(&content)?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Saves the payload at `path` as one record.
pub fn ingest_file(db: &MetricsDb, path: &Path) -> Result<MetricRecord, MetricsError> {
    let snapshot = load_snapshot(path)?;
    let record = db.save(&snapshot)?;
    tracing::info!("Ingested {:?} as {}", path, record.id);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ingest_file_saves_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "commitHash": "1a2b3c",
                "branch": "main",
                "timestamp": "2025-05-01T08:30:00Z",
                "performance": { "bundleSize": 512000, "loadTime": 950 }
            }"#,
        )
        .unwrap();

        let db = MetricsDb::in_memory().unwrap();
        let record = ingest_file(&db, &path).unwrap();
        assert_eq!(record.snapshot.commit_hash, "1a2b3c");
        assert_eq!(record.snapshot.performance.bundle_size, Some(512_000));
        assert!(record.snapshot.performance.ttfb.is_none());
        assert_eq!(db.count(None).unwrap(), 1);
    }

    #[test]
    fn test_ingest_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let db = MetricsDb::in_memory().unwrap();
        let err = ingest_file(&db, &dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, MetricsError::Io(_)));
    }

    #[test]
    fn test_ingest_invalid_payload_is_not_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"commitHash": "x", "branch": "main", "timestamp": "2025-05-01T08:30:00Z",
                "lighthouse": {"performance": 140}}"#,
        )
        .unwrap();

        let db = MetricsDb::in_memory().unwrap();
        let err = ingest_file(&db, &path).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidRecord(_)));
        assert_eq!(db.count(None).unwrap(), 0);
    }

    #[test]
    fn test_ingest_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, "not json at all {{{").unwrap();
        let db = MetricsDb::in_memory().unwrap();
        assert!(matches!(
            ingest_file(&db, &path).unwrap_err(),
            MetricsError::Json(_)
        ));
    }
}
