//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use super::models::*;
use crate::error::AppError;

const SESSION_TOKEN_HASH_PREFIX: &str = "sha256:";

/// Hash a session token for storage and lookup
///
/// Raw bearer tokens never touch the database.
pub fn hash_session_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!(
        "{}{}",
        SESSION_TOKEN_HASH_PREFIX,
        URL_SAFE_NO_PAD.encode(digest)
    )
}

fn map_unique_violation(error: sqlx::Error, message: &str) -> AppError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::StoreUnavailable(error),
    }
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::StoreUnavailable(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user
    ///
    /// # Errors
    /// `Conflict` if the email or username is already taken
    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            email: new_user.email.clone(),
            username: new_user.username.clone(),
            name: new_user.name.clone(),
            password_hash: new_user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, name, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Email or username is already in use"))?;

        Ok(user)
    }

    /// Find a user by email or username
    ///
    /// Both columns use `NOCASE` collation, so the match ignores ASCII case.
    pub async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = ? OR username = ? LIMIT 1",
        )
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Whether `email` belongs to a user other than `user_id`
    pub async fn email_taken_by_other(&self, email: &str, user_id: &str) -> Result<bool, AppError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = ? AND id != ? LIMIT 1")
                .bind(email)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// Update display name and email
    ///
    /// # Returns
    /// The updated user, or None if it no longer exists
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(email)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "Email is already in use"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_user_by_id(user_id).await
    }

    /// Replace a user's password hash
    pub async fn update_user_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a user together with their sessions and notes
    ///
    /// # Returns
    /// Whether a user row was deleted
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM notes WHERE owner_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Record a newly issued session token
    pub async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, AppError> {
        let session = SessionRecord {
            id: EntityId::new().0,
            user_id: user_id.to_string(),
            token_hash: hash_session_token(token),
            expires_at,
            revoked: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, expires_at, revoked, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.revoked)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Find the session issued for `token`
    pub async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>, AppError> {
        let session =
            sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions WHERE token_hash = ?")
                .bind(hash_session_token(token))
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    /// Mark every session issued for `token` as revoked
    ///
    /// # Returns
    /// Number of sessions that changed state
    pub async fn revoke_sessions_by_token(&self, token: &str) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = 1 WHERE token_hash = ? AND revoked = 0")
                .bind(hash_session_token(token))
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// List all sessions of a user, newest first
    pub async fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, AppError> {
        let sessions = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Insert a note for `owner_id`
    pub async fn insert_note(&self, owner_id: &str, new_note: &NewNote) -> Result<Note, AppError> {
        let now = Utc::now();
        let note = Note {
            id: EntityId::new().0,
            owner_id: owner_id.to_string(),
            title: new_note.title.clone(),
            content: new_note.content.clone(),
            color: new_note
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
            tags: new_note.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        let tags_json =
            serde_json::to_string(&note.tags).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO notes (id, owner_id, title, content, color, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(&note.owner_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.color)
        .bind(tags_json)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(note)
    }

    /// Get a note by ID regardless of owner
    pub async fn get_note(&self, id: &str) -> Result<Option<Note>, AppError> {
        let row = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Note::from))
    }

    /// List a user's notes
    ///
    /// # Arguments
    /// * `order_by_created` - Newest created first instead of most recently updated
    pub async fn list_notes(
        &self,
        owner_id: &str,
        order_by_created: bool,
    ) -> Result<Vec<Note>, AppError> {
        let sql = if order_by_created {
            "SELECT * FROM notes WHERE owner_id = ? ORDER BY created_at DESC"
        } else {
            "SELECT * FROM notes WHERE owner_id = ? ORDER BY updated_at DESC"
        };

        let rows = sqlx::query_as::<_, NoteRow>(sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Note::from).collect())
    }

    /// Apply a partial update to a note
    pub async fn update_note(&self, existing: &Note, patch: NotePatch) -> Result<Note, AppError> {
        let mut note = existing.clone();
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        if let Some(color) = patch.color {
            note.color = color;
        }
        if let Some(tags) = patch.tags {
            note.tags = tags;
        }
        note.updated_at = Utc::now();

        let tags_json =
            serde_json::to_string(&note.tags).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            "UPDATE notes SET title = ?, content = ?, color = ?, tags = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.color)
        .bind(tags_json)
        .bind(note.updated_at)
        .bind(&note.id)
        .execute(&self.pool)
        .await?;

        Ok(note)
    }

    /// Delete a note
    pub async fn delete_note(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
