use crate::{config::UpstreamsConfig, utils::redact_url};
use url::Url;

/// Public mainnet endpoint used when nothing is configured.
pub const DEFAULT_UPSTREAM: &str = "https://api.mainnet-beta.solana.com/";

/// Hostname fragments mapped to provider names for display labels.
const KNOWN_PROVIDERS: &[&str] =
    &["helius", "quicknode", "ankr", "alchemy", "syndica", "chainstack"];

/// Bare names operators sometimes put where a URL belongs.
const PLACEHOLDERS: &[&str] = &["quicknode", "helius"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoint {
    pub url: String,
    pub label: String,
}

impl UpstreamEndpoint {
    #[must_use]
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

/// Ordered upstream endpoints; index 0 is the primary.
///
/// Never empty: resolution falls back to [`DEFAULT_UPSTREAM`].
#[derive(Debug, Clone)]
pub struct UpstreamRegistry {
    endpoints: Vec<UpstreamEndpoint>,
}

impl UpstreamRegistry {
    /// Resolves endpoints from configuration.
    ///
    /// `lookup` reads the environment variables named by `secret_keys`.
    pub fn resolve<F>(config: &UpstreamsConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_secrets: Vec<String> = config
            .secret_keys
            .iter()
            .filter_map(|name| lookup(name))
            .filter_map(|raw| normalize_upstream_url(&raw))
            .collect();

        let urls = if from_secrets.is_empty() {
            config.urls.iter().filter_map(|raw| normalize_upstream_url(raw)).collect()
        } else {
            from_secrets
        };

        Self::from_urls(urls, &config.aliases)
    }

    /// Builds a registry from already-normalized URLs.
    #[must_use]
    pub fn from_urls(urls: Vec<String>, aliases: &[String]) -> Self {
        let urls = if urls.is_empty() { vec![DEFAULT_UPSTREAM.to_string()] } else { urls };
        let labels = compute_labels(&urls, aliases);
        let endpoints = urls
            .into_iter()
            .zip(labels)
            .map(|(url, label)| UpstreamEndpoint { url, label })
            .collect();
        Self { endpoints }
    }

    #[must_use]
    pub fn endpoints(&self) -> &[UpstreamEndpoint] {
        &self.endpoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    #[must_use]
    pub fn primary(&self) -> Option<&UpstreamEndpoint> {
        self.endpoints.first()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.label.clone()).collect()
    }

    #[must_use]
    pub fn redacted_urls(&self) -> Vec<String> {
        self.endpoints.iter().map(UpstreamEndpoint::redacted_url).collect()
    }

    /// Label for `url`, or the detected provider name if it is not registered.
    #[must_use]
    pub fn label_for(&self, url: &str) -> String {
        self.endpoints
            .iter()
            .find(|e| e.url == url)
            .map_or_else(|| detect_provider_name(url), |e| e.label.clone())
    }
}

/// Cleans up an operator-supplied upstream URL.
///
/// Returns `None` for blanks, bare provider placeholders, and strings that
/// do not parse as a URL even after a scheme is added.
#[must_use]
pub fn normalize_upstream_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return None;
    }

    let unquoted = trimmed.trim_matches('"').trim_matches('\'');
    if unquoted.is_empty() {
        return None;
    }

    let with_scheme = if let Some(rest) = unquoted.strip_prefix("//") {
        format!("https://{rest}")
    } else if has_http_scheme(unquoted) {
        unquoted.to_string()
    } else {
        format!("https://{unquoted}")
    };

    Url::parse(&with_scheme).ok().map(String::from)
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Provider name guessed from the hostname, or the hostname itself.
#[must_use]
pub fn detect_provider_name(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "upstream".to_string();
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.is_empty() {
        return "upstream".to_string();
    }
    KNOWN_PROVIDERS
        .iter()
        .find(|p| host.contains(*p))
        .map_or(host.clone(), |p| (*p).to_string())
}

/// Display labels for `urls`, by alias position or `<provider> <n>`.
#[must_use]
pub fn compute_labels(urls: &[String], aliases: &[String]) -> Vec<String> {
    if !aliases.is_empty() {
        return (0..urls.len())
            .map(|i| {
                aliases
                    .get(i)
                    .filter(|a| !a.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("upstream {}", i + 1))
            })
            .collect();
    }

    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    urls.iter()
        .map(|url| {
            let base = detect_provider_name(url);
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            format!("{base} {n}")
        })
        .collect()
}
