//! CSRF protection (double-submit cookie)
//!
//! A signed, short-lived token is stored in an HTTP-only cookie and must be
//! echoed in the `X-CSRF-Token` header of every state-changing request.

use axum::http::{HeaderMap, Method};
use axum_extra::extract::cookie::Cookie;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::cookies::{CSRF_COOKIE, CSRF_HEADER, cookie_value, csrf_cookie};
use super::token::{TokenCodec, TokenError};
use crate::error::AppError;

/// CSRF token lifetime in seconds
pub const CSRF_TTL_SECONDS: i64 = 3600;

/// CSRF tokens carry nothing beyond the standard claims
#[derive(Debug, Serialize, Deserialize)]
struct CsrfPayload {}

/// Issues and validates anti-forgery tokens
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    codec: TokenCodec,
    secure_cookies: bool,
}

impl CsrfGuard {
    pub fn new(secret: &str, secure_cookies: bool) -> Self {
        Self {
            codec: TokenCodec::new(secret, "csrf"),
            secure_cookies,
        }
    }

    /// Issue a fresh CSRF token
    pub fn issue(&self) -> Result<String, AppError> {
        let issued = self
            .codec
            .issue(CsrfPayload {}, Duration::seconds(CSRF_TTL_SECONDS))?;
        Ok(issued.token)
    }

    /// Cookie carrying `token`
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        csrf_cookie(token, CSRF_TTL_SECONDS, self.secure_cookies)
    }

    /// Decide whether a request passes the double-submit check
    ///
    /// Safe methods always pass. Anything else fails closed unless the
    /// cookie and header are present, equal, and the token verifies.
    pub fn validate(&self, method: &Method, headers: &HeaderMap) -> bool {
        if is_safe_method(method) {
            return true;
        }

        let Some(cookie_token) = cookie_value(headers, CSRF_COOKIE) else {
            tracing::debug!("CSRF cookie missing");
            return false;
        };

        let Some(header_token) = headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        else {
            tracing::debug!("CSRF header missing");
            return false;
        };

        if !bool::from(cookie_token.as_bytes().ct_eq(header_token.as_bytes())) {
            tracing::debug!("CSRF header does not match cookie");
            return false;
        }

        match self.codec.verify::<CsrfPayload>(&cookie_token) {
            Ok(_) => true,
            Err(error) => {
                crate::metrics::TOKEN_VERIFICATION_FAILURES_TOTAL
                    .with_label_values(&["csrf", error.reason()])
                    .inc();
                match error {
                    TokenError::InvalidSignature => {
                        tracing::warn!("CSRF token failed signature verification")
                    }
                    TokenError::Expired => tracing::debug!("CSRF token expired"),
                }
                false
            }
        }
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
