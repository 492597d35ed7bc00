use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid metric record: {0}")]
    InvalidRecord(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let status = match &self {
            MetricsError::InvalidRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MetricsError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            MetricsError::NotFound(_) => StatusCode::NOT_FOUND,
            MetricsError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MetricsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MetricsError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
