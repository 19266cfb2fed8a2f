//! Session and CSRF cookies

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

/// Session cookie name
pub const SESSION_COOKIE: &str = "auth_token";

/// CSRF cookie name
pub const CSRF_COOKIE: &str = "csrf_token";

/// Request header echoing the CSRF cookie
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Build the session cookie
///
/// `max_age_seconds` matches the lifetime of the token it carries.
pub fn session_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Build the CSRF cookie
pub fn csrf_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Cookie used to clear the session cookie
pub fn session_removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Read a cookie value from raw request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(name)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}
