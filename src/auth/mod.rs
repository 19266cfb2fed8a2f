//! Authentication core
//!
//! Handles:
//! - Signed token issue and verification
//! - Password hashing
//! - Session login, logout and user resolution
//! - CSRF double-submit protection
//! - Extractors and middleware for handlers

pub mod cookies;
mod csrf;
mod middleware;
pub mod password;
pub mod session;
pub mod token;

pub use cookies::{CSRF_COOKIE, CSRF_HEADER, SESSION_COOKIE};
pub use csrf::{CSRF_TTL_SECONDS, CsrfGuard};
pub use middleware::{CurrentUser, require_csrf};
pub use session::{LoginOutcome, SessionManager, session_lifetime};
pub use token::{Claims, IssuedToken, TokenCodec, TokenError};
