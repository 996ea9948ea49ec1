use super::{HttpClient, UpstreamEndpoint, UpstreamError, UpstreamRegistry, UpstreamResponse};
use crate::{
    metrics::MetricsCollector,
    stats::{StatsEvent, StatsHandle, UpstreamReport},
    utils::SharedClock,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Sends a JSON-RPC body to one upstream URL.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn post(&self, url: &str, body: Bytes) -> Result<UpstreamResponse, UpstreamError>;
}

pub struct HttpTransport {
    client: Arc<HttpClient>,
    timeout: Duration,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: Arc<HttpClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn post(&self, url: &str, body: Bytes) -> Result<UpstreamResponse, UpstreamError> {
        self.client.post_json(url, body, self.timeout).await
    }
}

/// The reply chosen by [`UpstreamDispatcher::dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: UpstreamResponse,
    pub endpoint: UpstreamEndpoint,
    /// The chosen reply has a 2xx status.
    pub ok: bool,
    pub fallback_used: bool,
}

/// Walks the ordered upstream list until one endpoint answers 2xx.
///
/// | Reply                        | Action                                         |
/// |------------------------------|------------------------------------------------|
/// | 2xx                          | return it                                      |
/// | 429 / 503 from the primary   | start the primary cooldown, keep as candidate  |
/// | 401 / 403 from a fallback    | skip, never surfaced                           |
/// | other status                 | keep as candidate, try the next endpoint       |
/// | transport error              | try the next endpoint                          |
///
/// When the list is exhausted the latest candidate is returned; with no
/// candidate at all the call fails with [`UpstreamError::NoUpstreamAvailable`].
pub struct UpstreamDispatcher {
    registry: Arc<UpstreamRegistry>,
    transport: Arc<dyn UpstreamTransport>,
    stats: StatsHandle,
    metrics: Arc<MetricsCollector>,
    clock: SharedClock,
    cooldown: Duration,
    cooldown_until_ms: AtomicU64,
}

impl UpstreamDispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        transport: Arc<dyn UpstreamTransport>,
        stats: StatsHandle,
        metrics: Arc<MetricsCollector>,
        clock: SharedClock,
        cooldown: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            stats,
            metrics,
            clock,
            cooldown,
            cooldown_until_ms: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn primary_in_cooldown(&self) -> bool {
        self.clock.now_ms() < self.cooldown_until_ms.load(Ordering::Acquire)
    }

    /// Epoch milliseconds until which the primary is skipped, 0 if never throttled.
    #[must_use]
    pub fn cooldown_until_ms(&self) -> u64 {
        self.cooldown_until_ms.load(Ordering::Acquire)
    }

    fn start_cooldown(&self) {
        let until = self.clock.now_ms().saturating_add(self.cooldown_ms());
        self.cooldown_until_ms.fetch_max(until, Ordering::AcqRel);
        self.metrics.record_primary_cooldown();
    }

    fn cooldown_ms(&self) -> u64 {
        u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX)
    }

    /// # Errors
    ///
    /// Returns [`UpstreamError::NoUpstreamAvailable`] when no endpoint produced
    /// a usable reply.
    pub async fn dispatch(&self, body: Bytes) -> Result<DispatchOutcome, UpstreamError> {
        let endpoints = self.registry.endpoints();
        let start = usize::from(endpoints.len() > 1 && self.primary_in_cooldown());
        let mut candidate: Option<DispatchOutcome> = None;

        for (idx, endpoint) in endpoints.iter().enumerate().skip(start) {
            let started = Instant::now();
            let result = self.transport.post(&endpoint.url, body.clone()).await;
            let elapsed = started.elapsed();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        upstream = %endpoint.label,
                        error = %e,
                        "upstream request failed"
                    );
                    self.metrics.record_upstream_attempt(&endpoint.label, 0, elapsed);
                    self.metrics.record_upstream_error(&endpoint.label, &e);
                    self.report(endpoint, false, 0, Some(e.to_string())).await;
                    continue;
                }
            };

            let status = response.status;
            let ok = response.is_success();
            self.metrics.record_upstream_attempt(&endpoint.label, status, elapsed);
            self.report(endpoint, ok, status, None).await;

            if ok {
                if idx > 0 {
                    tracing::info!(
                        fallback_used = true,
                        upstream = %endpoint.label,
                        status,
                        "served by fallback upstream"
                    );
                    self.metrics.record_fallback_used(&endpoint.label);
                }
                return Ok(DispatchOutcome {
                    response,
                    endpoint: endpoint.clone(),
                    ok: true,
                    fallback_used: idx > 0,
                });
            }

            if idx == 0 && matches!(status, 429 | 503) {
                self.start_cooldown();
                tracing::warn!(
                    upstream = %endpoint.label,
                    status,
                    cooldown_secs = self.cooldown.as_secs(),
                    "primary upstream throttled, starting cooldown"
                );
            } else if idx > 0 && matches!(status, 401 | 403) {
                tracing::debug!(
                    upstream = %endpoint.label,
                    status,
                    "fallback upstream rejected request, skipping"
                );
                continue;
            }

            candidate = Some(DispatchOutcome {
                response,
                endpoint: endpoint.clone(),
                ok: false,
                fallback_used: idx > 0,
            });
        }

        candidate.ok_or(UpstreamError::NoUpstreamAvailable)
    }

    async fn report(
        &self,
        endpoint: &UpstreamEndpoint,
        ok: bool,
        status: u16,
        error: Option<String>,
    ) {
        self.stats.bump(StatsEvent::Upstream(UpstreamReport {
            ok,
            url: endpoint.redacted_url(),
            name: endpoint.label.clone(),
            status,
            error,
        }))
        .await;
    }
}
