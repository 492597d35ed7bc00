use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::MetricsError;
use crate::quality::db::{DateRange, MetricsQuery};
use crate::quality::service::{DashboardOverview, Statistics};
use crate::quality::trend::Trend;
use crate::quality::{MetricRecord, MetricSnapshot};
use crate::state::SharedState;

// ============================================================================
// Query params
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct BranchParams {
    pub branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub branch: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TryFrom<HistoryParams> for MetricsQuery {
    type Error = MetricsError;

    fn try_from(p: HistoryParams) -> Result<Self, Self::Error> {
        let date_range = match (p.since, p.until) {
            (Some(start), Some(end)) if start > end => {
                return Err(MetricsError::InvalidQuery(
                    "since must not be after until".to_string(),
                ))
            }
            (Some(start), Some(end)) => Some(DateRange { start, end }),
            (None, None) => None,
            _ => {
                return Err(MetricsError::InvalidQuery(
                    "since and until must be given together".to_string(),
                ))
            }
        };
        Ok(MetricsQuery {
            branch: p.branch,
            date_range,
            limit: p.limit,
        })
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn metrics_routes() -> Router<SharedState> {
    Router::new()
        .route("/metrics", get(history_handler).post(save_handler))
        .route("/metrics/latest", get(latest_handler))
        .route("/metrics/trends", get(trends_handler))
        .route("/metrics/dashboard", get(dashboard_handler))
        .route("/metrics/statistics", get(statistics_handler))
        .route("/metrics/{id}", get(record_handler))
}

// ============================================================================
// Handlers
// ============================================================================

async fn save_handler(
    State(state): State<SharedState>,
    Json(snapshot): Json<MetricSnapshot>,
) -> Result<(StatusCode, Json<MetricRecord>), MetricsError> {
    snapshot.validate()?;
    let record = state.service.db().save(&snapshot)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn history_handler(
    State(state): State<SharedState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<MetricRecord>>, MetricsError> {
    let filter = MetricsQuery::try_from(params)?;
    Ok(Json(state.service.db().query(&filter)?))
}

async fn record_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MetricRecord>, MetricsError> {
    state
        .service
        .db()
        .get(&id)?
        .map(Json)
        .ok_or_else(|| MetricsError::NotFound(format!("metric record {}", id)))
}

async fn latest_handler(
    State(state): State<SharedState>,
    Query(params): Query<BranchParams>,
) -> Result<Json<Option<MetricRecord>>, MetricsError> {
    Ok(Json(state.service.get_latest(params.branch.as_deref())?))
}

async fn trends_handler(
    State(state): State<SharedState>,
    Query(params): Query<BranchParams>,
) -> Result<Json<Vec<Trend>>, MetricsError> {
    Ok(Json(state.service.get_trends(params.branch.as_deref())?))
}

async fn dashboard_handler(
    State(state): State<SharedState>,
    Query(params): Query<BranchParams>,
) -> Result<Json<DashboardOverview>, MetricsError> {
    Ok(Json(
        state
            .service
            .get_dashboard_overview(params.branch.as_deref())?,
    ))
}

async fn statistics_handler(
    State(state): State<SharedState>,
    Query(params): Query<BranchParams>,
) -> Result<Json<Statistics>, MetricsError> {
    Ok(Json(state.service.get_statistics(params.branch.as_deref())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_history_params_without_range() {
        let filter = MetricsQuery::try_from(HistoryParams {
            branch: Some("main".to_string()),
            limit: Some(5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.branch.as_deref(), Some("main"));
        assert_eq!(filter.limit, Some(5));
        assert!(filter.date_range.is_none());
    }

    #[test]
    fn test_history_params_half_open_range_rejected() {
        let err = MetricsQuery::try_from(HistoryParams {
            since: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidQuery(_)));
    }

    #[test]
    fn test_history_params_inverted_range_rejected() {
        let err = MetricsQuery::try_from(HistoryParams {
            since: Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("since must not be after until"));
    }
}
