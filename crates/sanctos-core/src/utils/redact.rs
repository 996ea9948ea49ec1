//! Redaction of provider credentials embedded in upstream URLs.

use url::Url;

const SECRET_QUERY_KEYS: &[&str] = &["api-key", "apikey", "key", "token"];
const REDACTED: &str = "REDACTED";

/// Replaces API keys carried in query parameters or path segments with `REDACTED`.
///
/// Provider URLs commonly embed the key as a long opaque path segment
/// (`/v2/<key>`) or as a query parameter (`?api-key=<key>`).
#[must_use]
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return redact_unparsed(raw);
    };

    let pairs: Vec<(String, String)> =
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    if pairs.iter().any(|(k, _)| is_secret_key(k)) {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(k, v)| {
            if is_secret_key(k) {
                (k.as_str(), REDACTED)
            } else {
                (k.as_str(), v.as_str())
            }
        }));
    }

    let segments: Option<Vec<String>> = url.path_segments().map(|segments| {
        segments
            .filter(|s| !s.is_empty())
            .map(|s| if looks_like_secret(s) { REDACTED.to_string() } else { s.to_string() })
            .collect()
    });
    if let Some(segments) = segments {
        url.set_path(&format!("/{}", segments.join("/")));
    }

    url.to_string()
}

fn is_secret_key(key: &str) -> bool {
    SECRET_QUERY_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn looks_like_secret(segment: &str) -> bool {
    segment.len() >= 16 &&
        segment.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn redact_unparsed(raw: &str) -> String {
    let Some((base, query)) = raw.split_once('?') else {
        return raw.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if is_secret_key(k) => format!("{k}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{base}?{query}")
}
