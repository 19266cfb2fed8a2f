//! Common test utilities for E2E tests

#![allow(dead_code)]

use notekeep::{AppState, config};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

/// Cookies and CSRF token of a logged-in client
#[derive(Debug, Clone)]
pub struct TestSession {
    pub auth_token: String,
    pub csrf_token: String,
    pub user: Value,
}

impl TestSession {
    /// `Cookie` header carrying both cookies
    pub fn cookie_header(&self) -> String {
        format!(
            "auth_token={}; csrf_token={}",
            self.auth_token, self.csrf_token
        )
    }

    pub fn user_id(&self) -> String {
        self.user["id"].as_str().unwrap_or_default().to_string()
    }
}

/// Create test configuration with a database inside `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> config::AppConfig {
    config::AppConfig {
        environment: config::Environment::Development,
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
        },
        database: config::DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        },
        auth: config::AuthConfig {
            session_secret: "e2e-session-secret-0123456789abcdef".to_string(),
            csrf_secret: Some("e2e-csrf-secret-0123456789abcdefghij".to_string()),
        },
        gate: config::GateConfig::default(),
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_gate(|_| {}).await
    }

    /// Create a test server after adjusting the gate configuration
    pub async fn with_gate(configure: impl FnOnce(&mut config::GateConfig)) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        configure(&mut config.gate);

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = notekeep::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Register a user with [`TEST_PASSWORD`]
    pub async fn register(&self, username: &str) -> Value {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "name": format!("{} tester", username),
                "username": username,
                "email": format!("{}@example.com", username),
                "password": TEST_PASSWORD,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registration of {username} failed");

        let body: Value = response.json().await.unwrap();
        body["user"].clone()
    }

    /// Log in and capture the session and CSRF cookies
    pub async fn login(&self, identifier: &str, remember_me: bool) -> TestSession {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({
                "identifier": identifier,
                "password": TEST_PASSWORD,
                "rememberMe": remember_me,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login as {identifier} failed");

        let auth_token = set_cookie_value(&response, "auth_token").unwrap();
        let csrf_token = set_cookie_value(&response, "csrf_token").unwrap();
        let body: Value = response.json().await.unwrap();

        TestSession {
            auth_token,
            csrf_token,
            user: body["user"].clone(),
        }
    }

    /// Register and log in a fresh user
    pub async fn signed_in(&self, username: &str) -> TestSession {
        self.register(username).await;
        self.login(username, false).await
    }
}

/// Full `Set-Cookie` header for cookie `name`
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&prefix))
        .map(ToOwned::to_owned)
}

/// Value of cookie `name` set by `response`
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let header = set_cookie_header(response, name)?;
    let pair = header.split(';').next()?;
    pair.split_once('=').map(|(_, value)| value.to_string())
}
