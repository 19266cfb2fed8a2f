//! Signed, time-limited tokens
//!
//! Token format: base64(claims).base64(hmac_sha256(base64(claims)))
//!
//! Claims carry a purpose label so a token minted for one use (e.g. CSRF)
//! is rejected by a codec configured for another (e.g. sessions).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Token verification failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Signature mismatch, malformed token, or wrong purpose
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token is past its expiry instant
    #[error("token expired")]
    Expired,
}

impl TokenError {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature => AppError::InvalidSignature,
            TokenError::Expired => AppError::Expired,
        }
    }
}

/// Claims embedded in every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims<P> {
    /// Purpose label
    pub pur: String,
    /// Issued at
    pub iat: DateTime<Utc>,
    /// Expires at
    pub exp: DateTime<Utc>,
    /// Random per-token value
    pub nonce: String,
    #[serde(flatten)]
    pub payload: P,
}

/// A freshly issued token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// HMAC-SHA256 token issuer and verifier for one purpose
#[derive(Clone)]
pub struct TokenCodec {
    secret: Arc<[u8]>,
    purpose: &'static str,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec
    ///
    /// # Arguments
    /// * `secret` - HMAC secret key
    /// * `purpose` - Label embedded in and required from every token
    pub fn new(secret: &str, purpose: &'static str) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
            purpose,
        }
    }

    pub fn purpose(&self) -> &'static str {
        self.purpose
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AppError::Encryption(e.to_string()))
    }

    /// Issue a token valid for `ttl` from now
    pub fn issue<P: Serialize>(&self, payload: P, ttl: Duration) -> Result<IssuedToken, AppError> {
        self.issue_at(payload, ttl, Utc::now())
    }

    /// Issue a token valid for `ttl` from `now`
    pub fn issue_at<P: Serialize>(
        &self,
        payload: P,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AppError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let claims = Claims {
            pur: self.purpose.to_string(),
            iat: now,
            exp: now + ttl,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            payload,
        };

        let json = serde_json::to_vec(&claims).map_err(|e| AppError::Internal(e.into()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(IssuedToken {
            token: format!("{}.{}", payload_b64, signature_b64),
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Verify a token against the current time
    pub fn verify<P: DeserializeOwned>(&self, token: &str) -> Result<Claims<P>, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature, purpose and expiry of a token at `now`
    ///
    /// The signature is checked before anything is decoded.
    pub fn verify_at<P: DeserializeOwned>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims<P>, TokenError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(TokenError::InvalidSignature)?;
        if signature_b64.contains('.') {
            return Err(TokenError::InvalidSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;

        let mut mac = self.mac().map_err(|_| TokenError::InvalidSignature)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let claims: Claims<P> =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::InvalidSignature)?;

        if claims.pur != self.purpose {
            return Err(TokenError::InvalidSignature);
        }

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
