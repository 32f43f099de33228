//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::workflow::TransitionError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid, missing or blocked bearer keys
/// - **Authorization Errors**: Role not permitted for the operation
/// - **Resource Errors**: Requested resources not found
/// - **Workflow Errors**: Status transitions the state machine rejects
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer key is missing, invalid, inactive, or belongs to a blocked user.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The authenticated user may not perform this operation.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A referenced resource does not exist or is not visible to the caller.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The application's current status does not allow the requested event.
    ///
    /// Returns HTTP 409 Conflict.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The request collides with existing state (duplicate member, reviewer, ...).
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request is well formed but breaks a business rule.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("{0}")]
    RuleViolation(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` → 401 Unauthorized
/// - `Forbidden` → 403 Forbidden
/// - `NotFound` → 404 Not Found
/// - `InvalidTransition`, `Conflict` → 409 Conflict
/// - `RuleViolation` → 422 Unprocessable Entity
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, "invalid_transition", self.to_string())
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::RuleViolation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "rule_violation",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(ref err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Map unique-constraint violations to `Conflict`, everything else to `Database`.
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        other => AppError::Database(other),
    }
}
