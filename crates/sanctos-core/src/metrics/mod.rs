//! Prometheus metrics.
//!
//! Recording goes straight to the global `metrics` recorder and never takes a
//! lock. Upstream labels are interned so hot-path recording does not allocate
//! once every label has been seen.

use crate::{
    stats::TrafficLane,
    types::CacheTag,
    upstream::UpstreamError,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{
    borrow::Cow,
    sync::OnceLock,
    time::Duration,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static UPSTREAM_LABEL_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

/// Interns an upstream display label. The pool is bounded by the number of
/// configured upstreams.
#[inline]
fn upstream_to_static(upstream: &str) -> Cow<'static, str> {
    let pool = UPSTREAM_LABEL_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(upstream) {
        return Cow::Borrowed(*interned);
    }

    let owned = upstream.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

fn status_class(status: u16) -> &'static str {
    match status {
        0 => "transport",
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "global metrics recorder already installed, using a detached recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}

impl MetricsCollector {
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self { prometheus_handle: init_prometheus_recorder() })
    }

    pub fn record_traffic(&self, lane: TrafficLane) {
        counter!("sanctos_requests_total", "lane" => lane.as_str()).increment(1);
    }

    pub fn record_cache_tag(&self, tag: CacheTag) {
        counter!("sanctos_cache_responses_total", "tag" => tag.as_str()).increment(1);
    }

    /// Records one upstream attempt; `status` is 0 for transport failures.
    pub fn record_upstream_attempt(&self, upstream: &str, status: u16, latency: Duration) {
        let upstream = upstream_to_static(upstream);
        counter!(
            "sanctos_upstream_requests_total",
            "upstream" => upstream.clone(),
            "status" => status_class(status)
        )
        .increment(1);
        histogram!("sanctos_upstream_duration_seconds", "upstream" => upstream)
            .record(latency.as_secs_f64());
    }

    pub fn record_upstream_error(&self, upstream: &str, error: &UpstreamError) {
        counter!(
            "sanctos_upstream_errors_total",
            "upstream" => upstream_to_static(upstream),
            "kind" => error.kind()
        )
        .increment(1);
    }

    pub fn record_fallback_used(&self, upstream: &str) {
        counter!("sanctos_upstream_fallback_total", "upstream" => upstream_to_static(upstream))
            .increment(1);
    }

    pub fn record_primary_cooldown(&self) {
        counter!("sanctos_primary_cooldowns_total").increment(1);
    }

    pub fn record_inflight(&self, entries: usize, revalidations: usize) {
        #[allow(clippy::cast_precision_loss)]
        {
            gauge!("sanctos_inflight_entries").set(entries as f64);
            gauge!("sanctos_inflight_revalidations").set(revalidations as f64);
        }
    }

    pub fn record_indexer(&self, outcome: &'static str) {
        counter!("sanctos_indexer_requests_total", "outcome" => outcome).increment(1);
    }

    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}
