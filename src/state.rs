use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::quality::service::QualityMetricsService;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub service: QualityMetricsService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: QualityMetricsService) -> Self {
        Self {
            service,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::db::MetricsDb;

    #[test]
    fn test_state_wraps_service_handle() {
        let db = Arc::new(MetricsDb::in_memory().unwrap());
        let state = AppState::new(QualityMetricsService::new(db.clone()));
        assert!(state.started_at <= Utc::now());
        assert_eq!(Arc::strong_count(&db), 2);
        assert!(state.service.db().path().is_none());
    }
}
