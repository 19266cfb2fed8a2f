//! Authentication middleware
//!
//! Handlers resolve the acting user through [`CurrentUser`]; state-changing
//! routes are additionally wrapped in [`require_csrf`].

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::cookies::{SESSION_COOKIE, cookie_value};
use crate::AppState;
use crate::data::PublicUser;
use crate::error::AppError;

/// Middleware rejecting state-changing requests without a valid CSRF token
///
/// # Usage
/// ```ignore
/// let routes = Router::new()
///     .route("/api/notes", post(create_note))
///     .route_layer(middleware::from_fn_with_state(state, require_csrf));
/// ```
pub async fn require_csrf(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.csrf.validate(request.method(), request.headers()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "CSRF validation failed"
        );
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
///
/// Performs the full check (signature, expiry, revocation, user existence)
/// via the session manager. Rejects with `401` otherwise.
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", user.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub PublicUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<PublicUser>().cloned() {
            return Ok(CurrentUser(user));
        }

        let state = AppState::from_ref(state);
        let token = cookie_value(&parts.headers, SESSION_COOKIE);
        let user = state.sessions.require_user(token.as_deref()).await?;
        parts.extensions.insert(user.clone());

        Ok(CurrentUser(user))
    }
}
