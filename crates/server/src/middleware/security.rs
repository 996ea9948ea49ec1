use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Inline script and styles are allowed because the dashboard is a single
/// self-contained page.
const DASHBOARD_CSP: &str = concat!(
    "default-src 'self'; img-src 'self' data:; ",
    "style-src 'self' 'unsafe-inline'; script-src 'self' 'unsafe-inline'"
);

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("x-frame-options", "DENY"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains; preload"),
];

/// Adds the browser hardening headers; `html` also sets the dashboard CSP.
pub fn apply_security_headers(headers: &mut HeaderMap, html: bool) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if html {
        headers.insert(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(DASHBOARD_CSP),
        );
    }
}
