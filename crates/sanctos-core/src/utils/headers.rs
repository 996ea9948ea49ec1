use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Response headers that must not be relayed from an upstream to the client.
///
/// CORS is decided by the edge node alone, cookies from a provider are never
/// meaningful to a browser talking to this node, and framing headers are
/// recomputed by the server.
const STRIPPED: &[&str] = &["set-cookie", "content-length", "transfer-encoding", "connection"];

#[must_use]
pub fn strip_upstream_headers(src: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(src.len());
    for (name, value) in src {
        let lower = name.as_str();
        if lower.starts_with("access-control-") || STRIPPED.contains(&lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Sets `name` to `value`, silently skipping values that are not valid header text.
pub fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl AsRef<str>) {
    if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
