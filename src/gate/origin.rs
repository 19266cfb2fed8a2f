//! Origin and Referer checks for API requests

use axum::http::{HeaderMap, header};
use url::{Host, Url};

/// Why a request was refused as cross-origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginRejection {
    /// `Origin` is unparseable or names another host
    Origin,
    /// `Referer` is unparseable or names another host
    Referer,
}

impl OriginRejection {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            OriginRejection::Origin => "origin",
            OriginRejection::Referer => "referer",
        }
    }
}

/// Paths that bootstrap a session and may be reached from a foreign referer
const AUTH_BOOTSTRAP_PREFIX: &str = "/api/auth/";

/// Check the declared origin of an API request
///
/// Returns the validated `Origin` value, if one was presented, so the
/// response can echo it in `Access-Control-Allow-Origin`.
pub fn check_request_origin(
    headers: &HeaderMap,
    path: &str,
) -> Result<Option<String>, OriginRejection> {
    let request_host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(host_header_hostname);

    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().map_err(|_| OriginRejection::Origin)?;
        if is_trusted_url(origin, request_host.as_deref()) {
            return Ok(Some(origin.to_string()));
        }
        return Err(OriginRejection::Origin);
    }

    if path.starts_with(AUTH_BOOTSTRAP_PREFIX) {
        return Ok(None);
    }

    if let Some(referer) = headers.get(header::REFERER) {
        let referer = referer.to_str().map_err(|_| OriginRejection::Referer)?;
        if !is_trusted_url(referer, request_host.as_deref()) {
            return Err(OriginRejection::Referer);
        }
    }

    Ok(None)
}

/// Whether `url` names the request's own host or a loopback address
fn is_trusted_url(url: &str, request_host: Option<&str>) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host() else {
        return false;
    };

    if is_loopback(&host) {
        return true;
    }

    match (parsed.host_str(), request_host) {
        (Some(candidate), Some(expected)) => normalize_hostname(candidate) == expected,
        _ => false,
    }
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => normalize_hostname(domain) == "localhost",
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

/// Hostname part of a `Host` header value, without the port
fn host_header_hostname(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = Url::parse(&format!("http://{}", value)).ok()?;
    parsed.host_str().map(normalize_hostname)
}

fn normalize_hostname(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(host: &str, origin: Option<&str>, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        if let Some(referer) = referer {
            headers.insert(header::REFERER, HeaderValue::from_str(referer).unwrap());
        }
        headers
    }

    #[test]
    fn same_host_origin_is_trusted() {
        let result = check_request_origin(
            &headers("notes.example", Some("https://notes.example"), None),
            "/api/notes",
        );
        assert_eq!(result, Ok(Some("https://notes.example".to_string())));
    }

    #[test]
    fn port_and_case_do_not_matter() {
        let result = check_request_origin(
            &headers("Notes.Example:8443", Some("https://notes.example:8443"), None),
            "/api/notes",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_origin_is_rejected() {
        let result = check_request_origin(
            &headers("notes.example", Some("https://evil.example"), None),
            "/api/notes",
        );
        assert_eq!(result, Err(OriginRejection::Origin));
    }

    #[test]
    fn unparseable_origin_is_rejected() {
        for origin in ["null", "not a url"] {
            let result =
                check_request_origin(&headers("notes.example", Some(origin), None), "/api/notes");
            assert_eq!(result, Err(OriginRejection::Origin));
        }
    }

    #[test]
    fn loopback_origins_are_trusted() {
        for origin in [
            "http://localhost:3000",
            "http://127.0.0.1:5173",
            "http://127.8.9.10",
            "http://[::1]:8080",
        ] {
            let result =
                check_request_origin(&headers("notes.example", Some(origin), None), "/api/notes");
            assert!(result.is_ok(), "{origin} should be trusted");
        }
    }

    #[test]
    fn referer_is_checked_without_origin() {
        let foreign = check_request_origin(
            &headers("notes.example", None, Some("https://evil.example/page")),
            "/api/notes",
        );
        assert_eq!(foreign, Err(OriginRejection::Referer));

        let garbage =
            check_request_origin(&headers("notes.example", None, Some("::::")), "/api/notes");
        assert_eq!(garbage, Err(OriginRejection::Referer));

        let same = check_request_origin(
            &headers("notes.example", None, Some("https://notes.example/notes")),
            "/api/notes",
        );
        assert_eq!(same, Ok(None));
    }

    #[test]
    fn auth_paths_skip_referer_check() {
        let result = check_request_origin(
            &headers("notes.example", None, Some("https://evil.example/")),
            "/api/auth/login",
        );
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn no_declared_origin_passes() {
        assert_eq!(
            check_request_origin(&headers("notes.example", None, None), "/api/notes"),
            Ok(None)
        );
    }
}
