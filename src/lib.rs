//! Notekeep - a personal note-taking service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Edge (axum middleware)                      │
//! │  - Security headers                                         │
//! │  - Request gate: origin, CORS, cookie presence, rate limit  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Auth, account and note endpoints                         │
//! │  - CSRF guard on state-changing routes                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Auth Core                             │
//! │  - Token codec, session manager, CSRF guard                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: Tokens, sessions, passwords and CSRF
//! - `gate`: Edge authorization and security headers
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod gate;
pub mod metrics;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool and the session manager.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Login, logout and current-user resolution
    pub sessions: Arc<auth::SessionManager>,

    /// CSRF token issue and validation
    pub csrf: Arc<auth::CsrfGuard>,

    /// Per-client request counters for the gate
    pub rate_limiter: Arc<dyn gate::RateLimitStore>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Validate configuration
    /// 2. Connect to SQLite database
    /// 3. Build the session manager and CSRF guard
    /// 4. Create the in-memory rate limiter
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Refuse to start without usable secrets
        config.validate()?;

        // 2. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 3. Auth core
        let sessions = Arc::new(auth::SessionManager::new(
            db.clone(),
            &config.auth.session_secret,
        ));
        let csrf = Arc::new(auth::CsrfGuard::new(
            config.auth.csrf_signing_secret(),
            config.should_use_secure_cookies(),
        ));

        // 4. Rate limiter
        let rate_limiter = Arc::new(gate::FixedWindowLimiter::new(
            config.gate.rate_limit_max_requests,
            config.gate.rate_limit_window_seconds,
            config.gate.max_tracked_clients,
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            sessions,
            csrf,
            rate_limiter,
        })
    }

    /// Replace the rate limit store
    ///
    /// Used for shared stores in multi-instance deployments and by tests.
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn gate::RateLimitStore>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    /// Request body ceiling (notes included)
    const MAX_BODY_BYTES: usize = 1024 * 1024;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::auth_router())
        .merge(api::user_router(state.clone()))
        .merge(api::notes_router(state.clone()))
        .merge(api::metrics_router())
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::request_gate,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::security_headers,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Unmatched paths still pass through the gate, so page paths redirect
async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
