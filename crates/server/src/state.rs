use sanctos_core::{
    config::AppConfig,
    indexer::IndexerProxy,
    metrics::MetricsCollector,
    proxy::ProxyEngine,
    utils::SharedClock,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: ProxyEngine,
    pub indexer: Arc<IndexerProxy>,
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,

    /// Random per-process id reported in `x-sanctos-instance`.
    pub instance_id: Arc<str>,
}

impl AppState {
    #[must_use]
    pub fn new(
        engine: ProxyEngine,
        indexer: Arc<IndexerProxy>,
        config: Arc<AppConfig>,
        clock: SharedClock,
    ) -> Self {
        Self {
            engine,
            indexer,
            config,
            clock,
            instance_id: Arc::from(Uuid::new_v4().to_string()),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.engine.context().metrics
    }
}
