//! E2E tests for login, logout, registration and CSRF issuance

mod common;

use common::{TEST_PASSWORD, TestServer, set_cookie_header, set_cookie_value};
use serde_json::{Value, json};

#[tokio::test]
async fn test_csrf_endpoint_sets_strict_cookie() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/api/auth/csrf"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cookie = set_cookie_header(&response, "csrf_token").expect("csrf cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(!cookie.contains("Secure"));

    let cookie_value = set_cookie_value(&response, "csrf_token").unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["csrfToken"], cookie_value.as_str());
}

#[tokio::test]
async fn test_login_sets_session_and_csrf_cookies() {
    let server = TestServer::new().await;
    server.register("ada").await;

    let response = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "identifier": "ada", "password": TEST_PASSWORD }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let session_cookie = set_cookie_header(&response, "auth_token").expect("session cookie");
    assert!(session_cookie.contains("HttpOnly"));
    assert!(session_cookie.contains("SameSite=Lax"));
    assert!(session_cookie.contains("Path=/"));
    assert!(session_cookie.contains("Max-Age=86400"));
    assert!(set_cookie_header(&response, "csrf_token").is_some());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["username"], "ada");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["csrfToken"].as_str().is_some());
}

#[tokio::test]
async fn test_remember_me_extends_cookie_to_thirty_days() {
    let server = TestServer::new().await;
    server.register("ada").await;

    let response = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({
            "identifier": "ada@example.com",
            "password": TEST_PASSWORD,
            "rememberMe": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let session_cookie = set_cookie_header(&response, "auth_token").unwrap();
    assert!(session_cookie.contains("Max-Age=2592000"));
}

#[tokio::test]
async fn test_login_identifier_is_case_insensitive() {
    let server = TestServer::new().await;
    server.register("ada").await;

    let session = server.login("ADA@Example.com", false).await;
    assert_eq!(session.user["username"], "ada");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let server = TestServer::new().await;
    server.register("ada").await;

    let mut bodies = Vec::new();
    for (identifier, password) in [("ada", "wrong password"), ("nobody", TEST_PASSWORD)] {
        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        assert!(set_cookie_header(&response, "auth_token").is_none());
        bodies.push(response.json::<Value>().await.unwrap());
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_validation_errors() {
    let server = TestServer::new().await;

    let missing_identifier = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "identifier": "", "password": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_identifier.status(), 400);

    let malformed = server
        .client
        .post(server.url("/api/auth/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
}

#[tokio::test]
async fn test_me_resolves_session() {
    let server = TestServer::new().await;
    let session = server.signed_in("ada").await;

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .header("cookie", session.cookie_header())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["id"], session.user["id"]);

    let anonymous = server
        .client
        .get(server.url("/api/auth/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
}

#[tokio::test]
async fn test_logout_revokes_session_and_clears_cookie() {
    let server = TestServer::new().await;
    let session = server.signed_in("ada").await;

    for _ in 0..2 {
        let response = server
            .client
            .post(server.url("/api/auth/logout"))
            .header("cookie", session.cookie_header())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let cleared = set_cookie_header(&response, "auth_token").expect("removal cookie");
        assert!(cleared.contains("Max-Age=0"));
    }

    // The token still carries a valid signature but its session is revoked
    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .header("cookie", session.cookie_header())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_register_conflicts_and_validation() {
    let server = TestServer::new().await;
    server.register("ada").await;

    let duplicate = server
        .client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "name": "Other Ada",
            "username": "ada",
            "email": "other@example.com",
            "password": TEST_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let invalid = server
        .client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "name": "Bob",
            "username": "Bob Smith",
            "email": "bob@example.com",
            "password": TEST_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);

    // Registration does not sign the user in
    let fresh = server
        .client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "name": "Bob",
            "username": "bob",
            "email": "bob@example.com",
            "password": TEST_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(fresh.status(), 201);
    assert!(set_cookie_header(&fresh, "auth_token").is_none());
}
