//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Minimum length of any signing secret
pub const MIN_SECRET_BYTES: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gate: GateConfig,
    pub logging: LoggingConfig,
}

/// Deployment environment label
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Token signing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session token secret (32+ bytes)
    pub session_secret: String,
    /// CSRF token secret (32+ bytes)
    ///
    /// Required in production. Development reuses the session secret.
    pub csrf_secret: Option<String>,
}

impl AuthConfig {
    /// Secret used to sign CSRF tokens
    pub fn csrf_signing_secret(&self) -> &str {
        self.csrf_secret
            .as_deref()
            .unwrap_or(self.session_secret.as_str())
    }
}

/// Request gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Path prefixes that require a session cookie
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
    /// Exact paths that are always public
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Path prefixes served without any gate checks
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,
    /// Fixed rate limit window in seconds (default: 60)
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,
    /// Requests allowed per client per window (default: 100)
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    /// Maximum number of client keys tracked in memory
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
    /// Key clients by the first X-Forwarded-For hop
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            protected_paths: default_protected_paths(),
            public_paths: default_public_paths(),
            static_prefixes: default_static_prefixes(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            max_tracked_clients: default_max_tracked_clients(),
            trust_forwarded_for: false,
        }
    }
}

fn default_protected_paths() -> Vec<String> {
    ["/notes", "/api/notes", "/api/user", "/settings"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_public_paths() -> Vec<String> {
    [
        "/",
        "/login",
        "/register",
        "/api/auth/login",
        "/api/auth/register",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_static_prefixes() -> Vec<String> {
    ["/static", "/assets", "/images", "/favicon"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_rate_limit_window_seconds() -> u64 {
    60
}

fn default_rate_limit_max_requests() -> u32 {
    100
}

fn default_max_tracked_clients() -> usize {
    10_000
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("notekeep={},tower_http=debug", self.level.trim())
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (NOTEKEEP_*)
    ///
    /// Values are not validated here; [`AppState::new`](crate::AppState::new)
    /// runs [`validate`](Self::validate) once at startup.
    ///
    /// # Errors
    /// Returns error if a source cannot be read or deserialized
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/notekeep.db")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (NOTEKEEP_*)
            .add_source(
                Environment::with_prefix("NOTEKEEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        Self::from_config(config)
    }

    /// Deserialize an already built configuration without validating it
    pub fn from_config(config: ::config::Config) -> Result<Self, crate::error::AppError> {
        config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.is_production()
    }

    /// Check the configuration before anything is served
    ///
    /// There is no built-in signing secret: startup fails instead.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.auth.session_secret.as_bytes().len() < MIN_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        match &self.auth.csrf_secret {
            Some(secret) if secret.as_bytes().len() < MIN_SECRET_BYTES => {
                return Err(crate::error::AppError::Config(format!(
                    "auth.csrf_secret must be at least {} bytes",
                    MIN_SECRET_BYTES
                )));
            }
            Some(secret) if self.is_production() && *secret == self.auth.session_secret => {
                return Err(crate::error::AppError::Config(
                    "auth.csrf_secret must differ from auth.session_secret in production"
                        .to_string(),
                ));
            }
            Some(_) => {}
            None if self.is_production() => {
                return Err(crate::error::AppError::Config(
                    "auth.csrf_secret is required in production".to_string(),
                ));
            }
            None => {
                tracing::warn!(
                    "auth.csrf_secret is not set; CSRF tokens are signed with the session secret"
                );
            }
        }

        if self.gate.rate_limit_window_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "gate.rate_limit_window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.gate.rate_limit_max_requests == 0 {
            return Err(crate::error::AppError::Config(
                "gate.rate_limit_max_requests must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            tracing::warn!(
                environment = ?self.environment,
                "Using insecure cookies for local development"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/notekeep-test.db"),
            },
            auth: AuthConfig {
                session_secret: "s".repeat(32),
                csrf_secret: None,
            },
            gate: GateConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_development_without_csrf_secret() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
        assert_eq!(config.auth.csrf_signing_secret(), config.auth.session_secret);
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_requires_csrf_secret_in_production() {
        let mut config = valid_config();
        config.environment = Environment::Production;

        let error = config
            .validate()
            .expect_err("production without csrf secret must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.csrf_secret is required")
        ));

        config.auth.csrf_secret = Some(config.auth.session_secret.clone());
        assert!(config.validate().is_err());

        config.auth.csrf_secret = Some("c".repeat(32));
        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_zero_rate_limit() {
        let mut config = valid_config();
        config.gate.rate_limit_max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_config_defers_validation_to_startup() {
        let source = ::config::Config::builder()
            .set_override("server.host", "127.0.0.1")
            .unwrap()
            .set_override("server.port", 8080)
            .unwrap()
            .set_override("database.path", "/tmp/notekeep-test.db")
            .unwrap()
            .set_override("auth.session_secret", "short-secret")
            .unwrap()
            .set_override("logging.level", "debug")
            .unwrap()
            .set_override("logging.format", "json")
            .unwrap()
            .build()
            .unwrap();

        let config = AppConfig::from_config(source).unwrap();
        assert!(config.auth.csrf_secret.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn logging_level_feeds_default_filter() {
        let mut logging = valid_config().logging;
        assert_eq!(logging.default_filter(), "notekeep=info,tower_http=debug");
        assert!(!logging.is_json());

        logging.level = "debug".to_string();
        logging.format = "JSON".to_string();
        assert_eq!(logging.default_filter(), "notekeep=debug,tower_http=debug");
        assert!(logging.is_json());
    }

    #[test]
    fn default_gate_protects_notes() {
        let gate = GateConfig::default();
        assert!(gate.protected_paths.iter().any(|p| p == "/api/notes"));
        assert_eq!(gate.rate_limit_window_seconds, 60);
    }
}
