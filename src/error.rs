//! Error types for Notekeep
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Authentication and authorization failures are resolved into status
/// codes here and never leak which check failed.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Forbidden")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique constraint conflict (409)
    #[error("{0}")]
    Conflict(String),

    /// Unknown identifier or wrong password (401)
    ///
    /// Both cases share this variant so callers cannot tell them apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Token is past its expiry instant (401)
    #[error("Token expired")]
    Expired,

    /// Rate limit exceeded (429)
    #[error("Too many requests")]
    RateLimited {
        /// Seconds until the current window resets
        retry_after: u64,
    },

    /// Credential store I/O failure (500)
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized
            | AppError::InvalidCredentials
            | AppError::InvalidSignature
            | AppError::Expired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreUnavailable(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (error_message, error_type) = match &self {
            AppError::NotFound => (self.to_string(), "not_found"),
            AppError::Unauthorized => (self.to_string(), "unauthorized"),
            // Token failures collapse to the same client-visible message
            AppError::InvalidSignature => (
                AppError::Unauthorized.to_string(),
                "invalid_signature",
            ),
            AppError::Expired => (AppError::Unauthorized.to_string(), "expired"),
            AppError::InvalidCredentials => (self.to_string(), "invalid_credentials"),
            AppError::Forbidden => (self.to_string(), "forbidden"),
            AppError::Validation(msg) => (msg.clone(), "validation"),
            AppError::Conflict(msg) => (msg.clone(), "conflict"),
            AppError::RateLimited { .. } => (self.to_string(), "rate_limited"),
            AppError::StoreUnavailable(e) => {
                tracing::error!(error = %e, "Credential store error");
                ("Internal server error".to_string(), "store_unavailable")
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                ("Internal server error".to_string(), "config")
            }
            AppError::Encryption(msg) => {
                tracing::error!(error = %msg, "Encryption error");
                ("Internal server error".to_string(), "encryption")
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                ("Internal server error".to_string(), "internal")
            }
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        let mut response = (self.status(), body).into_response();
        if let AppError::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.max(1)),
            );
        }
        response
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
