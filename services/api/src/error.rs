//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and the JSON error
//! responses returned by the HTTP handlers.

use axum::http::StatusCode;
use axum::Json;
use bookchat_core::ports::PortError;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP Error: {0}")]
    Http(#[from] axum::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The `{ "error": "..." }` body every failing endpoint returns.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// What handlers return on failure.
pub type HandlerError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// The HTTP status a port failure surfaces as.
pub fn port_status(error: &PortError) -> StatusCode {
    match error {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a port failure to a response, using `message` for the body.
pub fn port_error(error: &PortError, message: impl Into<String>) -> HandlerError {
    error_response(port_status(error), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_http_statuses() {
        assert_eq!(port_status(&PortError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(port_status(&PortError::Invalid("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(port_status(&PortError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            port_status(&PortError::QuotaExceeded("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
