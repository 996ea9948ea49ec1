//! Builder for [`ProxyEngine`].

use super::engine::{ProxyEngine, SharedContext};
use crate::{
    cache::{CachePolicy, CacheStore, MokaCacheStore, SwrCache, SwrSettings},
    coalescer::InflightCoalescer,
    config::{CacheConfig, UpstreamsConfig},
    metrics::MetricsCollector,
    stats::StatsHandle,
    upstream::{HttpClient, HttpTransport, UpstreamDispatcher, UpstreamRegistry, UpstreamTransport},
    utils::{SharedClock, SystemClock},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(String),

    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    #[error("upstream registry is required but was not provided")]
    MissingRegistry,

    #[error("stats handle is required but was not provided")]
    MissingStats,
}

/// Builder for constructing a [`ProxyEngine`].
///
/// # Examples
///
/// ```no_run
/// # use sanctos_core::{
/// #     config::{StatsConfig, UpstreamsConfig},
/// #     proxy::ProxyEngineBuilder,
/// #     stats::{spawn_stats_actor, MemoryStatsStorage},
/// #     upstream::UpstreamRegistry,
/// #     utils::SystemClock,
/// # };
/// # use std::sync::Arc;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let clock = Arc::new(SystemClock);
/// let (stats, _task) =
///     spawn_stats_actor(Arc::new(MemoryStatsStorage::new()), clock.clone(), &StatsConfig::default());
/// let registry = UpstreamRegistry::resolve(&UpstreamsConfig::default(), |_| None);
///
/// let engine = ProxyEngineBuilder::new()
///     .registry(Arc::new(registry))
///     .stats(stats)
///     .clock(clock)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ProxyEngineBuilder {
    registry: Option<Arc<UpstreamRegistry>>,
    transport: Option<Arc<dyn UpstreamTransport>>,
    http_client: Option<Arc<HttpClient>>,
    concurrency_limit: usize,
    upstream_timeout: Duration,
    cooldown: Duration,
    cache_config: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    stats: Option<StatsHandle>,
    clock: Option<SharedClock>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProxyEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        let upstreams = UpstreamsConfig::default();
        Self {
            registry: None,
            transport: None,
            http_client: None,
            concurrency_limit: upstreams.concurrent_limit,
            upstream_timeout: Duration::from_secs(upstreams.timeout_seconds),
            cooldown: Duration::from_secs(upstreams.primary_cooldown_seconds),
            cache_config: CacheConfig::default(),
            store: None,
            stats: None,
            clock: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<UpstreamRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the HTTP transport, e.g. with a scripted one in tests.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn UpstreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an existing client instead of building one.
    #[must_use]
    pub fn http_client(mut self, client: Arc<HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Applies timeout, cooldown and concurrency settings.
    #[must_use]
    pub fn upstreams_config(mut self, config: &UpstreamsConfig) -> Self {
        self.concurrency_limit = config.concurrent_limit;
        self.upstream_timeout = Duration::from_secs(config.timeout_seconds);
        self.cooldown = Duration::from_secs(config.primary_cooldown_seconds);
        self
    }

    #[must_use]
    pub fn primary_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    #[must_use]
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn stats(mut self, stats: StatsHandle) -> Self {
        self.stats = Some(stats);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    ///
    /// Returns [`BuilderError::MissingRegistry`] or [`BuilderError::MissingStats`]
    /// when a required part is absent, and an init error if the HTTP client
    /// or metrics recorder cannot be created.
    pub fn build(self) -> Result<ProxyEngine, BuilderError> {
        let registry = self.registry.ok_or(BuilderError::MissingRegistry)?;
        let stats = self.stats.ok_or(BuilderError::MissingStats)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                MetricsCollector::new().map_err(|e| BuilderError::MetricsInit(e.to_string()))?,
            ),
        };

        let transport: Arc<dyn UpstreamTransport> = match self.transport {
            Some(transport) => transport,
            None => {
                let client = match self.http_client {
                    Some(client) => client,
                    None => Arc::new(
                        HttpClient::with_concurrency_limit(self.concurrency_limit)
                            .map_err(|e| BuilderError::HttpClientInit(e.to_string()))?,
                    ),
                };
                Arc::new(HttpTransport::new(client, self.upstream_timeout))
            }
        };

        let dispatcher = Arc::new(UpstreamDispatcher::new(
            registry,
            transport,
            stats.clone(),
            Arc::clone(&metrics),
            Arc::clone(&clock),
            self.cooldown,
        ));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MokaCacheStore::new(self.cache_config.max_bytes)));
        let cache = SwrCache::new(store, clock, SwrSettings::from(&self.cache_config));

        Ok(ProxyEngine::from_context(SharedContext {
            policy: CachePolicy::new(
                self.cache_config.cache_all,
                self.cache_config.default_ttl_seconds,
            ),
            cache,
            dispatcher,
            stats,
            metrics,
            fetches: InflightCoalescer::new(),
            revalidations: InflightCoalescer::new(),
        }))
    }
}

impl Default for ProxyEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
