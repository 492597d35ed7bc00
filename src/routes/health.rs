use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::error::MetricsError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub records: u64,
    pub started_at: String,
    pub db_path: Option<String>,
}

pub async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, MetricsError> {
    let db = state.service.db();
    let records = db.count(None)?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        records,
        started_at: state.started_at.to_rfc3339(),
        db_path: db.path().map(|p| p.display().to_string()),
    }))
}
