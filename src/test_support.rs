//! Shared fixtures for unit tests

use tempfile::TempDir;

use crate::AppState;
use crate::config::{
    AppConfig, AuthConfig, DatabaseConfig, Environment, GateConfig, LoggingConfig, ServerConfig,
};

/// Development config with a database inside `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> AppConfig {
    AppConfig {
        environment: Environment::Development,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        },
        auth: AuthConfig {
            session_secret: "session-secret-for-unit-tests-0123456789".to_string(),
            csrf_secret: Some("csrf-secret-for-unit-tests-0123456789ab".to_string()),
        },
        gate: GateConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Application state backed by a fresh database in `temp_dir`
pub async fn test_state(temp_dir: &TempDir) -> AppState {
    AppState::new(test_config(temp_dir))
        .await
        .expect("test state can be created")
}
