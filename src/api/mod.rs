//! API layer
//!
//! HTTP handlers for:
//! - Authentication (`/api/auth/*`)
//! - Account settings and export (`/api/user/*`)
//! - Notes (`/api/notes*`)
//! - Metrics (Prometheus)

mod auth;
mod dto;
pub mod metrics;
mod notes;
mod user;

pub use dto::*;

pub use auth::auth_router;
pub use metrics::metrics_router;
pub use notes::notes_router;
pub use user::user_router;

use axum::Json;
use axum::extract::rejection::JsonRejection;

use crate::error::AppError;

/// Unwrap a JSON body, mapping malformed input to a 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected request body");
            Err(AppError::Validation("Validation failed".to_string()))
        }
    }
}
