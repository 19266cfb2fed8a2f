//! Request gate
//!
//! Edge authorization evaluated before any handler runs. The gate only
//! checks that a session cookie is present; handlers verify it through
//! the session manager.
//!
//! Decision sequence (short-circuiting):
//! 1. Static assets bypass everything
//! 2. API requests must come from the request's own host (Origin/Referer)
//! 3. API responses carry CORS headers for the validated origin
//! 4. Unprotected or public paths pass
//! 5. Protected paths need a session cookie (401 for API, redirect for pages)
//! 6. Protected API paths are rate limited per client

mod headers;
mod origin;
mod rate_limit;

pub use headers::security_headers;
pub use origin::{OriginRejection, check_request_origin};
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, RateLimitStore};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::net::SocketAddr;

use crate::AppState;
use crate::auth::{CSRF_HEADER, SESSION_COOKIE, cookies::cookie_value};
use crate::config::GateConfig;
use crate::error::AppError;
use crate::metrics::GATE_REJECTIONS_TOTAL;

const API_PREFIX: &str = "/api";
const LOGIN_PATH: &str = "/login";
const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

/// Gate middleware
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route(...)
///     .layer(middleware::from_fn_with_state(state.clone(), request_gate));
/// ```
pub async fn request_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();

    if is_static_path(&path, &state.config.gate.static_prefixes) {
        return next.run(request).await;
    }

    if !is_api_path(&path) {
        return authorize_page(&state.config.gate, &path, request, next).await;
    }

    let cors_origin = match check_request_origin(request.headers(), &path) {
        Ok(origin) => origin,
        Err(rejection) => {
            GATE_REJECTIONS_TOTAL
                .with_label_values(&[rejection.reason()])
                .inc();
            tracing::warn!(
                path = %path,
                reason = rejection.reason(),
                "Rejected cross-origin API request"
            );
            return AppError::Forbidden.into_response();
        }
    };

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        authorize_api(&state, &path, request, next).await
    };
    apply_cors_headers(response.headers_mut(), cors_origin.as_deref());
    response
}

async fn authorize_page(gate: &GateConfig, path: &str, request: Request, next: Next) -> Response {
    if !is_protected_path(path, gate) || has_session_cookie(request.headers()) {
        return next.run(request).await;
    }

    GATE_REJECTIONS_TOTAL
        .with_label_values(&["unauthenticated"])
        .inc();
    tracing::debug!(path = %path, "Redirecting unauthenticated page request to login");
    Redirect::temporary(&format!(
        "{}?redirect={}",
        LOGIN_PATH,
        urlencoding::encode(path)
    ))
    .into_response()
}

async fn authorize_api(state: &AppState, path: &str, request: Request, next: Next) -> Response {
    let gate = &state.config.gate;
    if !is_protected_path(path, gate) {
        return next.run(request).await;
    }

    if !has_session_cookie(request.headers()) {
        GATE_REJECTIONS_TOTAL
            .with_label_values(&["unauthenticated"])
            .inc();
        tracing::debug!(path = %path, "Rejected API request without session cookie");
        return AppError::Unauthorized.into_response();
    }

    let key = client_key(&request, gate.trust_forwarded_for);
    let now = Utc::now();
    let decision = state.rate_limiter.hit(&key, now).await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        GATE_REJECTIONS_TOTAL
            .with_label_values(&["rate_limited"])
            .inc();
        tracing::warn!(client = %key, path = %path, "Rate limit exceeded");
        AppError::RateLimited {
            retry_after: decision.retry_after_seconds(now),
        }
        .into_response()
    };
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

pub(crate) fn is_static_path(path: &str, static_prefixes: &[String]) -> bool {
    static_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

fn is_api_path(path: &str) -> bool {
    path == API_PREFIX
        || path
            .strip_prefix(API_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether `path` requires a session cookie
///
/// Protected entries match whole path segments, so `/notes` covers
/// `/notes/123` but not `/notesfoo`. Exact public paths always win.
pub fn is_protected_path(path: &str, gate: &GateConfig) -> bool {
    if gate.public_paths.iter().any(|public| public == path) {
        return false;
    }

    gate.protected_paths.iter().any(|protected| {
        let protected = protected.trim_end_matches('/');
        path == protected
            || path
                .strip_prefix(protected)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    cookie_value(headers, SESSION_COOKIE).is_some()
}

/// Rate limit key for the client behind `request`
///
/// With `trust_forwarded_for`, the key is the rightmost `X-Forwarded-For`
/// hop: the address appended by the trusted proxy. Earlier hops are written
/// by the client and never used.
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.rsplit(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    if let Some(origin) = origin.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_str(&format!("content-type, authorization, {}", CSRF_HEADER))
            .unwrap_or_else(|_| HeaderValue::from_static("content-type")),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}
