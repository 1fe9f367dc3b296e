//! Error types for the read surface.
//!
//! [`ObserverError`] converts into a JSON response of the form
//! `{"error": ..., "status": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use objectdb_core::MonitorStopped;
use objectdb_db::DbError;

/// Errors that can occur in the read surface.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invalid query parameter was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The store could not answer.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// The change monitor has stopped.
    #[error(transparent)]
    Unavailable(#[from] MonitorStopped),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) => {
                tracing::error!(error = %e, "read failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
