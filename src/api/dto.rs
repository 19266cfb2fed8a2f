//! Request and response DTOs
//!
//! JSON bodies use camelCase field names.

use serde::{Deserialize, Serialize};

use crate::auth::password::validate_password_strength;
use crate::data::{Note, PublicUser};
use crate::error::AppError;

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email or username
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.identifier.trim().is_empty() {
            return Err(AppError::Validation(
                "Email or username is required".to_string(),
            ));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub user: PublicUser,
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub message: String,
    pub csrf_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterRequest {
    /// Check all fields, reporting the first problem found
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        validate_username(self.username.trim())?;
        validate_email(self.email.trim())?;
        validate_password_strength(&self.password)
    }
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: PublicUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(AppError::Validation(
                "Name and email are required".to_string(),
            ));
        }
        validate_email(self.email.trim())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Everything stored for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub user: PublicUser,
    pub notes: Vec<Note>,
}

// =============================================================================
// Notes
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteListQuery {
    pub tag: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub color: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateNoteRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::Validation("Content is required".to_string()));
        }
        Ok(())
    }
}

/// Partial note update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteNoteResponse {
    pub success: bool,
    pub message: String,
}

// =============================================================================
// Field validation
// =============================================================================

const MAX_USERNAME_LEN: usize = 30;

/// Lowercase letters, digits and underscores
fn validate_username(username: &str) -> Result<(), AppError> {
    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::Validation(
            "Username can only contain lowercase letters, numbers, and underscores".to_string(),
        ));
    }
    Ok(())
}

/// Loose shape check: `local@domain.tld` without whitespace
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }

    let valid = !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        });

    if !valid {
        return Err(AppError::Validation("Email is invalid".to_string()));
    }
    Ok(())
}
