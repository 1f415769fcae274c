//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Validation**: malformed or disallowed destination addresses
/// - **Resource**: tracking or lookup of an unknown id
/// - **Fairness**: rate-limit guard tripped
/// - **Races**: dedup/uniqueness violations during creation
/// - **Upstream**: record store or image service unavailable
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Destination is malformed, uses a disallowed scheme, or (in
    /// production deployments) points at a private network.
    ///
    /// Returns HTTP 400 Bad Request with the specific reason.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Record does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Record not found")]
    NotFound,

    /// Rate-limit guard tripped. Carries the window reset time so the
    /// caller can compute a retry delay.
    ///
    /// Returns HTTP 429 Too Many Requests with a `Retry-After` header.
    #[error("Rate limit exceeded")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Uniqueness violation during a creation race.
    ///
    /// Recovered internally when the conflict is on the dedup key the
    /// caller attempted; surfaces as HTTP 409 only if recovery fails.
    #[error("Record already exists")]
    Conflict,

    /// Image service or another collaborator failed.
    ///
    /// Returns HTTP 500; safe for the caller to retry the whole call.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The management surface requires an owner identity.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Owner identity required")]
    IdentityRequired,
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal failures (`Database`, `Upstream`) are logged and surfaced as a
/// generic message; storage identifiers never leak beyond the public id.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Rate-limit responses carry the reset time in the body and a
        // Retry-After header so clients can back off correctly.
        if let AppError::RateLimited { reset_at } = self {
            let retry_after = (reset_at - Utc::now()).num_seconds().max(0);
            let body = Json(json!({
                "error": {
                    "code": "rate_limited",
                    "message": "Rate limit exceeded, retry after the reset time",
                    "reset_at": reset_at,
                }
            }));
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response();
        }

        let (status, code, message) = match self {
            AppError::InvalidDestination(ref reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_destination",
                format!("Invalid destination: {reason}"),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Conflict => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::IdentityRequired => (
                StatusCode::UNAUTHORIZED,
                "identity_required",
                self.to_string(),
            ),
            AppError::Database(ref err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Upstream(ref reason) => {
                tracing::error!(reason = %reason, "upstream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_failure",
                    "An upstream service failed, the request is safe to retry".to_string(),
                )
            }
            AppError::RateLimited { .. } => unreachable!("handled above"),
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

impl AppError {
    /// Whether this error is a server-side fault rather than a client
    /// mistake. Used to decide when a failed creation refunds its
    /// rate-limit charge.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Upstream(_))
    }
}
