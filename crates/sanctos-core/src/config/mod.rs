//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations below
//! 2. **Config file**: TOML file named by `SANCTOS_CONFIG` (default `config/config.toml`)
//! 3. **Structured environment**: `SANCTOS__SECTION__FIELD` variables
//! 4. **Edge environment**: the flat variable names used by existing deployments
//!    (`UPSTREAMS`, `SANCTOS_DEFAULT_TTL`, `INDEXER_URL`, ...), see
//!    [`AppConfig::apply_edge_env`]
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 8787
//!
//! [upstreams]
//! urls = ["https://mainnet.helius-rpc.com/?api-key=...", "https://api.mainnet-beta.solana.com"]
//! aliases = ["helius", "public"]
//!
//! [cache]
//! default_ttl_seconds = 2
//! swr_window_seconds = 60
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};

/// Floor applied to the indexer timeout, in milliseconds.
pub const MIN_INDEXER_TIMEOUT_MS: u64 = 250;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    /// Must be greater than 0. Defaults to `8787`.
    pub bind_port: u16,

    /// Maximum number of requests handled concurrently. Defaults to `1000`.
    pub max_concurrent_requests: usize,

    /// Largest accepted request body in bytes. Defaults to 1 MiB.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 8787,
            max_concurrent_requests: 1000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Upstream RPC endpoints.
///
/// Endpoints are taken from `secret_keys` first (each entry names an
/// environment variable holding a URL), then from `urls`, and fall back to the
/// public mainnet endpoint when both are empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    pub urls: Vec<String>,
    pub secret_keys: Vec<String>,
    /// Display labels, matched to endpoints by position.
    pub aliases: Vec<String>,
    pub timeout_seconds: u64,
    /// How long the primary is skipped after it answers 429 or 503.
    pub primary_cooldown_seconds: u64,
    pub concurrent_limit: usize,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            secret_keys: Vec::new(),
            aliases: Vec::new(),
            timeout_seconds: 30,
            primary_cooldown_seconds: 30,
            concurrent_limit: 1000,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache every method outside the write/sensitive sets, using `default_ttl_seconds`.
    pub cache_all: bool,
    pub default_ttl_seconds: u64,
    pub swr_window_seconds: u64,
    pub stale_fallback_on_error: bool,
    /// How far past the stale window an entry may still be served when every
    /// upstream fails.
    pub stale_fallback_max_age_seconds: u64,
    /// Await cache writes before replying.
    pub sync_write: bool,
    /// Upper bound on stored reply bytes, keys included.
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_all: false,
            default_ttl_seconds: 2,
            swr_window_seconds: 60,
            stale_fallback_on_error: true,
            stale_fallback_max_age_seconds: 300,
            sync_write: false,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` echoes any origin.
    pub allow_origins: Vec<String>,
    /// Headers exposed to browsers; empty means the built-in x-sanctos-* list.
    pub expose_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allow_origins: vec!["*".to_string()], expose_headers: Vec::new() }
    }
}

/// Optional passthrough to a separately hosted indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub url: Option<String>,
    /// Explicit switch; when unset the indexer is enabled iff `url` is set.
    pub enabled: Option<bool>,
    pub timeout_ms: u64,
    pub allowed_methods: Vec<String>,
    /// When non-empty, only these paths (relative to `/indexer`) are forwarded.
    pub allowed_paths: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            url: None,
            enabled: None,
            timeout_ms: 2500,
            allowed_methods: vec!["GET".to_string(), "HEAD".to_string(), "OPTIONS".to_string()],
            allowed_paths: Vec::new(),
        }
    }
}

impl IndexerConfig {
    /// Base URL with trailing slashes removed, if configured.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or_else(|| self.base_url().is_some())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MIN_INDEXER_TIMEOUT_MS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// JSON file the counters persist to; in-memory only when unset.
    pub storage_path: Option<String>,
    /// Number of most recent days kept in the per-day method histogram.
    pub retained_days: usize,
    /// Deadline for health reads before a degraded snapshot is served.
    pub request_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            retained_days: 10,
            request_timeout_ms: 1000,
            channel_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus text on `/metrics`.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstreams: UpstreamsConfig,
    pub cache: CacheConfig,
    pub cors: CorsConfig,
    pub indexer: IndexerConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with `SANCTOS__` environment overrides.
    ///
    /// Use `__` as a separator for nested fields (e.g. `SANCTOS__SERVER__BIND_PORT=8080`).
    /// List fields accept comma-separated values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_port", 8787)?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("SANCTOS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("upstreams.urls")
                    .with_list_parse_key("upstreams.secret_keys")
                    .with_list_parse_key("upstreams.aliases")
                    .with_list_parse_key("cors.allow_origins")
                    .with_list_parse_key("cors.expose_headers")
                    .with_list_parse_key("indexer.allowed_methods")
                    .with_list_parse_key("indexer.allowed_paths")
                    .try_parsing(true),
            )
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `SANCTOS_CONFIG` (default `config/config.toml`),
    /// then applies the edge environment variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SANCTOS_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        let mut config = Self::from_file(&config_path)?;
        config.apply_edge_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies the flat environment names used by edge deployments.
    ///
    /// Unset or blank variables leave the current value alone. Numeric values
    /// that fail to parse, or parse to zero where zero is meaningless, fall
    /// back to the compiled default.
    pub fn apply_edge_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("UPSTREAMS") {
            self.upstreams.urls = parse_csv(&v);
        }
        if let Some(v) = get("UPSTREAM_SECRET_KEYS") {
            self.upstreams.secret_keys = parse_csv(&v);
        }
        if let Some(v) = get("UPSTREAM_ALIASES") {
            self.upstreams.aliases = parse_csv(&v);
        }

        if let Some(v) = get("SANCTOS_CACHE_ALL") {
            self.cache.cache_all = v == "1";
        }
        if let Some(v) = get("SANCTOS_DEFAULT_TTL") {
            self.cache.default_ttl_seconds = v
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(CacheConfig::default().default_ttl_seconds);
        }
        if let Some(v) = get("SANCTOS_STALE_WINDOW") {
            self.cache.swr_window_seconds =
                v.parse().unwrap_or(CacheConfig::default().swr_window_seconds);
        }
        if let Some(v) = get("SANCTOS_STALE_FALLBACK_ON_ERROR") {
            self.cache.stale_fallback_on_error = v == "1";
        }
        if let Some(v) = get("SANCTOS_STALE_FALLBACK_MAX_AGE") {
            self.cache.stale_fallback_max_age_seconds =
                v.parse().unwrap_or(CacheConfig::default().stale_fallback_max_age_seconds);
        }
        if let Some(v) = get("SANCTOS_CACHE_SYNC_WRITE") {
            self.cache.sync_write = v == "1";
        }

        if let Some(v) = get("ALLOW_ORIGINS") {
            self.cors.allow_origins = parse_csv(&v);
        }
        if let Some(v) = get("EXPOSE_HEADERS") {
            self.cors.expose_headers = parse_csv(&v);
        }

        if let Some(v) = get("INDEXER_URL") {
            self.indexer.url = Some(v);
        }
        if let Some(v) = get("INDEXER_ENABLED") {
            self.indexer.enabled = Some(is_truthy(&v));
        }
        if let Some(v) = get("INDEXER_TIMEOUT_MS") {
            self.indexer.timeout_ms =
                v.parse().ok().filter(|n| *n > 0).unwrap_or(IndexerConfig::default().timeout_ms);
        }
        if let Some(v) = get("INDEXER_ALLOWED_METHODS") {
            self.indexer.allowed_methods = parse_csv(&v);
        }
        if let Some(v) = get("INDEXER_ALLOWED_PATHS") {
            self.indexer.allowed_paths = parse_csv(&v);
        }
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let addr = format!("{}:{}", self.server.bind_address, self.server.bind_port);
        addr.parse().map_err(|_| format!("Invalid socket address: {addr}"))
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstreams.timeout_seconds)
    }

    #[must_use]
    pub fn primary_cooldown(&self) -> Duration {
        Duration::from_secs(self.upstreams.primary_cooldown_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.upstreams.concurrent_limit == 0 {
            return Err("Upstream concurrency limit must be greater than 0".to_string());
        }

        if self.cache.max_bytes == 0 {
            return Err("Cache size limit must be greater than 0".to_string());
        }

        if self.upstreams.timeout_seconds == 0 {
            return Err("Upstream timeout must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        if let Some(base) = self.indexer.base_url() {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(format!("Invalid indexer URL: {base}"));
            }
        }

        if self.stats.retained_days == 0 {
            return Err("Stats retained days must be greater than 0".to_string());
        }

        if self.stats.channel_capacity == 0 {
            return Err("Stats channel capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// `1`, `true`, `yes` and `on`, case-insensitively.
#[must_use]
pub fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
