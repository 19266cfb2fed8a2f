//! Credential store seam used by the session manager
//!
//! The session manager only sees this trait. [`Database`] is the production
//! implementation; tests substitute failing stores.

use axum::async_trait;
use chrono::{DateTime, Utc};

use super::database::Database;
use super::models::{SessionRecord, User};
use crate::error::AppError;

/// User and session persistence needed for authentication
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by email or username
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError>;

    /// Look up a user by ID
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Persist a session for an issued token
    async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, AppError>;

    /// Load the session issued for `token`
    async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>, AppError>;

    /// Revoke every session issued for `token`
    async fn revoke_sessions_by_token(&self, token: &str) -> Result<u64, AppError>;

    /// Delete a user, cascading to sessions and notes
    async fn delete_user(&self, id: &str) -> Result<bool, AppError>;
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        Database::find_user_by_identifier(self, identifier).await
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Database::find_user_by_id(self, id).await
    }

    async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, AppError> {
        Database::create_session(self, user_id, token, expires_at).await
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>, AppError> {
        Database::find_session_by_token(self, token).await
    }

    async fn revoke_sessions_by_token(&self, token: &str) -> Result<u64, AppError> {
        Database::revoke_sessions_by_token(self, token).await
    }

    async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        Database::delete_user(self, id).await
    }
}
