//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies, backed by a session record
//! per issued token so logout can revoke a token that still verifies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::password::{verify_against_dummy, verify_password};
use super::token::{TokenCodec, TokenError};
use crate::data::{CredentialStore, PublicUser, SessionState};
use crate::error::AppError;
use crate::metrics::{LOGIN_ATTEMPTS_TOTAL, SESSIONS_REVOKED_TOTAL, TOKEN_VERIFICATION_FAILURES_TOTAL};

/// Session lifetime without "remember me" (1 day)
pub const SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Session lifetime with "remember me" (30 days)
pub const REMEMBER_ME_TTL_SECONDS: i64 = 30 * SESSION_TTL_SECONDS;

/// Session lifetime for a login
///
/// Fixed second counts, so there is no calendar or timezone arithmetic.
pub fn session_lifetime(remember_me: bool) -> Duration {
    if remember_me {
        Duration::seconds(REMEMBER_ME_TTL_SECONDS)
    } else {
        Duration::seconds(SESSION_TTL_SECONDS)
    }
}

/// Session token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Authenticated user, without password hash
    pub user: PublicUser,
    /// Signed session token for the cookie
    pub token: String,
    /// Expiry shared by the token and the session record
    pub expires_at: DateTime<Utc>,
    /// Cookie max-age
    pub max_age: Duration,
}

/// Login, logout and current-user resolution
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, secret: &str) -> Self {
        Self {
            store,
            codec: TokenCodec::new(secret, "session"),
        }
    }

    /// Authenticate with email or username and password
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown identifier or a wrong password
    /// - `StoreUnavailable` if the credential store fails
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, AppError> {
        self.login_at(identifier, password, remember_me, Utc::now())
            .await
    }

    /// [`login`](Self::login) with an explicit clock
    pub async fn login_at(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, AppError> {
        let user = match self.store.find_user_by_identifier(identifier.trim()).await {
            Ok(user) => user,
            Err(error) => {
                LOGIN_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
                return Err(error);
            }
        };

        let Some(user) = user else {
            verify_against_dummy(password);
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["rejected"]).inc();
            tracing::info!("Login rejected");
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash) {
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["rejected"]).inc();
            tracing::info!("Login rejected");
            return Err(AppError::InvalidCredentials);
        }

        let lifetime = session_lifetime(remember_me);
        let issued = self.codec.issue_at(
            SessionClaims {
                user_id: user.id.clone(),
            },
            lifetime,
            now,
        )?;

        if let Err(error) = self
            .store
            .create_session(&user.id, &issued.token, issued.expires_at)
            .await
        {
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
            return Err(error);
        }

        LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(
            user_id = %user.id,
            remember_me,
            expires_at = %issued.expires_at,
            "Session created"
        );

        Ok(LoginOutcome {
            user: user.public(),
            token: issued.token,
            expires_at: issued.expires_at,
            max_age: lifetime,
        })
    }

    /// Revoke the session for `token`
    ///
    /// Never fails: store errors are logged and the caller clears the
    /// cookie regardless. Repeating a logout is a no-op.
    pub async fn logout(&self, token: &str) {
        match self.store.revoke_sessions_by_token(token).await {
            Ok(0) => tracing::debug!("Logout for unknown or already revoked session"),
            Ok(count) => {
                SESSIONS_REVOKED_TOTAL.inc_by(count);
                tracing::info!(count, "Session revoked");
            }
            Err(error) => {
                tracing::error!(%error, "Failed to revoke session during logout");
            }
        }
    }

    /// Resolve the user behind a session token
    ///
    /// Returns None for any token that is invalid, expired, revoked, or
    /// whose user no longer exists. Never returns an error.
    pub async fn resolve_user(&self, token: &str) -> Option<PublicUser> {
        self.resolve_user_at(token, Utc::now()).await
    }

    /// [`resolve_user`](Self::resolve_user) with an explicit clock
    pub async fn resolve_user_at(&self, token: &str, now: DateTime<Utc>) -> Option<PublicUser> {
        let claims = match self.codec.verify_at::<SessionClaims>(token, now) {
            Ok(claims) => claims,
            Err(error) => {
                TOKEN_VERIFICATION_FAILURES_TOTAL
                    .with_label_values(&["session", error.reason()])
                    .inc();
                match error {
                    TokenError::InvalidSignature => {
                        tracing::warn!("Session token failed signature verification")
                    }
                    TokenError::Expired => tracing::debug!("Session token expired"),
                }
                return None;
            }
        };
        let user_id = claims.payload.user_id;

        let session = match self.store.find_session_by_token(token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(%user_id, "No session record for token");
                return None;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to load session");
                return None;
            }
        };

        if session.user_id != user_id {
            tracing::warn!(%user_id, "Session record belongs to another user");
            return None;
        }

        match session.state_at(now) {
            SessionState::Active => {}
            state => {
                tracing::debug!(%user_id, ?state, "Session is no longer active");
                return None;
            }
        }

        match self.store.find_user_by_id(&user_id).await {
            Ok(Some(user)) => Some(user.public()),
            Ok(None) => {
                tracing::debug!(%user_id, "User for session no longer exists");
                None
            }
            Err(error) => {
                tracing::error!(%error, "Failed to load session user");
                None
            }
        }
    }

    /// Resolve the user or fail with `Unauthorized`
    pub async fn require_user(&self, token: Option<&str>) -> Result<PublicUser, AppError> {
        let token = token.ok_or(AppError::Unauthorized)?;
        self.resolve_user(token).await.ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::data::{Database, NewUser, SessionRecord, User};
    use axum::async_trait;
    use tempfile::TempDir;

    const PASSWORD: &str = "correct horse battery";

    async fn setup() -> (SessionManager, Arc<Database>, User, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&temp_dir.path().join("test.db")).await.unwrap());
        let user = db
            .create_user(&NewUser {
                email: "ada@example.com".to_string(),
                username: "ada".to_string(),
                name: "Ada".to_string(),
                password_hash: hash_password(PASSWORD).unwrap(),
            })
            .await
            .unwrap();
        let manager = SessionManager::new(db.clone(), &"s".repeat(32));
        (manager, db, user, temp_dir)
    }

    #[tokio::test]
    async fn login_then_resolve_returns_same_user() {
        let (manager, _db, user, _dir) = setup().await;

        for identifier in ["ada", "ada@example.com"] {
            let outcome = manager.login(identifier, PASSWORD, false).await.unwrap();
            assert_eq!(outcome.user.id, user.id);

            let resolved = manager.resolve_user(&outcome.token).await.unwrap();
            assert_eq!(resolved.id, user.id);
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_indistinguishable() {
        let (manager, _db, _user, _dir) = setup().await;

        let wrong = manager.login("ada", "not the password", false).await.unwrap_err();
        let unknown = manager.login("nobody", PASSWORD, false).await.unwrap_err();

        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn remember_me_controls_exact_lifetime() {
        let (manager, db, _user, _dir) = setup().await;
        let now = Utc::now();

        let short = manager.login_at("ada", PASSWORD, false, now).await.unwrap();
        assert_eq!(short.expires_at - now, Duration::seconds(86_400));
        assert_eq!(short.max_age.num_seconds(), 86_400);

        let long = manager.login_at("ada", PASSWORD, true, now).await.unwrap();
        assert_eq!(long.expires_at - now, Duration::seconds(2_592_000));
        assert_eq!(long.max_age.num_seconds(), 2_592_000);

        let record = db.find_session_by_token(&long.token).await.unwrap().unwrap();
        assert_eq!(record.expires_at.timestamp(), long.expires_at.timestamp());
    }

    #[tokio::test]
    async fn expired_token_resolves_to_none() {
        let (manager, _db, _user, _dir) = setup().await;
        let now = Utc::now();
        let outcome = manager.login_at("ada", PASSWORD, false, now).await.unwrap();

        let just_before = now + Duration::seconds(SESSION_TTL_SECONDS - 1);
        assert!(manager.resolve_user_at(&outcome.token, just_before).await.is_some());

        let at_expiry = now + Duration::seconds(SESSION_TTL_SECONDS);
        assert!(manager.resolve_user_at(&outcome.token, at_expiry).await.is_none());
    }

    #[tokio::test]
    async fn token_from_other_secret_resolves_to_none() {
        let (manager, db, _user, _dir) = setup().await;
        let other = SessionManager::new(db.clone(), &"o".repeat(32));
        let outcome = other.login("ada", PASSWORD, false).await.unwrap();

        assert!(manager.resolve_user(&outcome.token).await.is_none());
    }

    #[tokio::test]
    async fn logout_revokes_and_is_idempotent() {
        let (manager, _db, _user, _dir) = setup().await;
        let outcome = manager.login("ada", PASSWORD, true).await.unwrap();
        let other_session = manager.login("ada", PASSWORD, true).await.unwrap();

        manager.logout(&outcome.token).await;
        assert!(manager.resolve_user(&outcome.token).await.is_none());

        manager.logout(&outcome.token).await;
        assert!(manager.resolve_user(&outcome.token).await.is_none());

        // Concurrent sessions are independent
        assert!(manager.resolve_user(&other_session.token).await.is_some());
    }

    #[tokio::test]
    async fn deleted_user_invalidates_tokens() {
        let (manager, db, user, _dir) = setup().await;
        let outcome = manager.login("ada", PASSWORD, false).await.unwrap();

        db.delete_user(&user.id).await.unwrap();
        assert!(manager.resolve_user(&outcome.token).await.is_none());
    }

    #[tokio::test]
    async fn require_user_maps_absence_to_unauthorized() {
        let (manager, _db, user, _dir) = setup().await;

        assert!(matches!(
            manager.require_user(None).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            manager.require_user(Some("garbage")).await,
            Err(AppError::Unauthorized)
        ));

        let outcome = manager.login("ada", PASSWORD, false).await.unwrap();
        let resolved = manager.require_user(Some(&outcome.token)).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    /// Store whose every call fails
    struct UnavailableStore;

    #[async_trait]
    impl CredentialStore for UnavailableStore {
        async fn find_user_by_identifier(&self, _: &str) -> Result<Option<User>, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }

        async fn find_user_by_id(&self, _: &str) -> Result<Option<User>, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }

        async fn create_session(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<SessionRecord, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }

        async fn find_session_by_token(&self, _: &str) -> Result<Option<SessionRecord>, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }

        async fn revoke_sessions_by_token(&self, _: &str) -> Result<u64, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }

        async fn delete_user(&self, _: &str) -> Result<bool, AppError> {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn store_outage_surfaces_on_login_only() {
        let secret = "s".repeat(32);
        let manager = SessionManager::new(Arc::new(UnavailableStore), &secret);

        let error = manager.login("ada", PASSWORD, false).await.unwrap_err();
        assert!(matches!(error, AppError::StoreUnavailable(_)));

        // Logout swallows the failure
        manager.logout("any-token").await;

        // A well-formed token cannot be confirmed, so nobody is resolved
        let token = TokenCodec::new(&secret, "session")
            .issue(
                SessionClaims {
                    user_id: "u".to_string(),
                },
                Duration::hours(1),
            )
            .unwrap()
            .token;
        assert!(manager.resolve_user(&token).await.is_none());
    }
}
