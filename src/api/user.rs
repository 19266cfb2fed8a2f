//! Account settings endpoints

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware,
    routing::{get, post, put},
};
use axum_extra::extract::CookieJar;

use super::dto::{
    ChangePasswordRequest, DeleteAccountRequest, ExportResponse, SuccessResponse,
    UpdateProfileRequest, UserResponse,
};
use super::json_body;
use crate::AppState;
use crate::auth::cookies::session_removal_cookie;
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::{CurrentUser, require_csrf};
use crate::data::User;
use crate::error::AppError;

/// Create the account router
///
/// State-changing routes require a CSRF token.
pub fn user_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/user/profile", put(update_profile))
        .route("/api/user/password", put(change_password))
        .route("/api/user/delete", post(delete_account))
        .route("/api/user/export", get(export_data))
        .route_layer(middleware::from_fn_with_state(state, require_csrf))
}

/// Load the full record of the acting user, password hash included
async fn load_account(state: &AppState, user_id: &str) -> Result<User, AppError> {
    state
        .db
        .find_user_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// PUT /api/user/profile
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let request = json_body(payload)?;
    request.validate()?;

    let name = request.name.trim();
    let email = request.email.trim();

    if email != user.email && state.db.email_taken_by_other(email, &user.id).await? {
        return Err(AppError::Conflict("Email is already in use".to_string()));
    }

    let updated = state
        .db
        .update_user_profile(&user.id, name, email)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(user_id = %updated.id, "Profile updated");

    Ok(Json(UserResponse {
        user: updated.public(),
    }))
}

/// PUT /api/user/password
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let request = json_body(payload)?;
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return Err(AppError::Validation(
            "Current password and new password are required".to_string(),
        ));
    }
    validate_password_strength(&request.new_password)?;

    let account = load_account(&state, &user.id).await?;
    if !verify_password(&request.current_password, &account.password_hash) {
        tracing::info!(user_id = %user.id, "Password change rejected");
        return Err(AppError::InvalidCredentials);
    }

    let password_hash = hash_password(&request.new_password)?;
    state
        .db
        .update_user_password(&user.id, &password_hash)
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/user/delete
///
/// Deletes the account with its notes and sessions, then clears the
/// session cookie.
async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    payload: Result<Json<DeleteAccountRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SuccessResponse>), AppError> {
    let request = json_body(payload)?;
    if request.password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    let account = load_account(&state, &user.id).await?;
    if !verify_password(&request.password, &account.password_hash) {
        tracing::info!(user_id = %user.id, "Account deletion rejected");
        return Err(AppError::InvalidCredentials);
    }

    if !state.db.delete_user(&user.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = %user.id, "Account deleted");

    Ok((
        jar.remove(session_removal_cookie()),
        Json(SuccessResponse { success: true }),
    ))
}

/// GET /api/user/export
async fn export_data(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ExportResponse>, AppError> {
    let notes = state.db.list_notes(&user.id, true).await?;

    tracing::info!(user_id = %user.id, notes = notes.len(), "Data exported");

    Ok(Json(ExportResponse { user, notes }))
}
