//! Authentication endpoints
//!
//! Login and registration are reachable without a CSRF token; they are
//! what bootstraps one. Logout clears the cookie regardless of outcome.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;

use super::dto::{
    CsrfResponse, LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UserResponse,
};
use super::json_body;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::auth::cookies::{SESSION_COOKIE, session_cookie, session_removal_cookie};
use crate::auth::password::hash_password;
use crate::data::NewUser;
use crate::error::AppError;

/// Create the authentication router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/csrf", get(issue_csrf))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
}

/// GET /api/auth/csrf
///
/// Issue a fresh CSRF cookie. The token is also returned in the body
/// because the cookie itself is HTTP-only.
async fn issue_csrf(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<CsrfResponse>), AppError> {
    let csrf_token = state.csrf.issue()?;
    let jar = jar.add(state.csrf.cookie(csrf_token.clone()));

    Ok((
        jar,
        Json(CsrfResponse {
            message: "CSRF token generated".to_string(),
            csrf_token,
        }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let request = json_body(payload)?;
    request.validate()?;

    let outcome = state
        .sessions
        .login(&request.identifier, &request.password, request.remember_me)
        .await?;

    let csrf_token = state.csrf.issue()?;
    let secure = state.config.should_use_secure_cookies();
    let jar = jar
        .add(session_cookie(
            outcome.token,
            outcome.max_age.num_seconds(),
            secure,
        ))
        .add(state.csrf.cookie(csrf_token.clone()));

    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user: outcome.user,
            csrf_token,
        }),
    ))
}

/// POST /api/auth/logout
///
/// Always succeeds from the client's point of view.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned()) {
        state.sessions.logout(&token).await;
    }

    (
        jar.remove(session_removal_cookie()),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// POST /api/auth/register
///
/// Creates the account only; the client logs in afterwards.
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let request = json_body(payload)?;
    request.validate()?;

    let password_hash = hash_password(&request.password)?;
    let user = state
        .db
        .create_user(&NewUser {
            email: request.email.trim().to_string(),
            username: request.username.trim().to_string(),
            name: request.name.trim().to_string(),
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((StatusCode::CREATED, Json(UserResponse { user: user.public() })))
}

/// GET /api/auth/me
async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { user })
}
