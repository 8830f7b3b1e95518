use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation error, tied to a specific field.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending request field.
        field: &'static str,
        /// Human-readable message.
        message: String,
    },

    /// Uniqueness conflict (e.g. duplicate rating).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or unknown user identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request error");
        }

        match self {
            AppError::Validation { field, message } => (
                status,
                Json(json!({ "field": field, "message": message })),
            )
                .into_response(),
            AppError::Internal(_) | AppError::Io(_) | AppError::Config(_) => {
                (status, "Internal error".to_string()).into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
