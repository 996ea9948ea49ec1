use super::{reply, ProxyError, RpcReply};
use crate::{
    cache::{compute_key, CacheDecision, CacheKey, CachePolicy, Lookup, PolicyReason, SwrCache},
    coalescer::{CoalescerStats, InflightCoalescer},
    metrics::MetricsCollector,
    stats::{CacheLane, StatsEvent, StatsHandle},
    types::{CacheTag, RpcBody, JSON_CONTENT_TYPE},
    upstream::{UpstreamDispatcher, UpstreamEndpoint, UpstreamError, UpstreamRegistry},
};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upstream reply shared by every caller coalesced onto one fetch.
#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    status: u16,
    content_type: String,
    body: Bytes,
    endpoint: UpstreamEndpoint,
    ttl: u64,
    tag: CacheTag,
}

type FetchResult = Result<Fetched, UpstreamError>;

/// Per-process state shared by every request.
pub struct SharedContext {
    pub policy: CachePolicy,
    pub cache: SwrCache,
    pub dispatcher: Arc<UpstreamDispatcher>,
    pub stats: StatsHandle,
    pub metrics: Arc<MetricsCollector>,
    pub(crate) fetches: InflightCoalescer<FetchResult>,
    pub(crate) revalidations: InflightCoalescer<()>,
}

impl SharedContext {
    /// The single upstream fetch behind a cache miss. Runs detached, so the
    /// write-back happens even if every waiting caller has gone away.
    async fn fetch_and_store(
        &self,
        key: CacheKey,
        request: RpcBody,
        raw: Bytes,
        ttl: u64,
    ) -> FetchResult {
        self.stats.bump(StatsEvent::Cache { lane: CacheLane::Miss, n: 1 }).await;

        let outcome = self.dispatcher.dispatch(raw).await?;
        let status = outcome.response.status;
        let content_type =
            outcome.response.content_type().unwrap_or(JSON_CONTENT_TYPE).to_string();
        let (tag, decision) = self.evaluate(&request, status, &outcome.response.body, ttl);

        if let Some(decision) = decision {
            debug!(
                cache_key = %key,
                ttl = decision.ttl,
                reason = decision.reason.as_str(),
                "caching upstream reply"
            );
            let entry = self.cache.new_entry(
                status,
                content_type.clone(),
                outcome.response.body.clone(),
                decision.ttl,
            );
            self.cache.write_back(key, entry).await;
        }

        Ok(Fetched {
            status,
            content_type,
            body: outcome.response.body,
            endpoint: outcome.endpoint,
            ttl,
            tag,
        })
    }

    /// Refreshes a stale entry. Failures leave the stale entry in place.
    async fn revalidate(&self, key: CacheKey, request: RpcBody, raw: Bytes, ttl: u64) {
        let outcome = match self.dispatcher.dispatch(raw).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(cache_key = %key, error = %e, "background revalidation failed");
                return;
            }
        };

        let status = outcome.response.status;
        match self.evaluate(&request, status, &outcome.response.body, ttl) {
            (_, Some(decision)) => {
                let content_type =
                    outcome.response.content_type().unwrap_or(JSON_CONTENT_TYPE).to_string();
                let entry =
                    self.cache.new_entry(status, content_type, outcome.response.body, decision.ttl);
                self.cache.write_back(key, entry).await;
            }
            (tag, None) => {
                debug!(
                    cache_key = %key,
                    tag = %tag,
                    "revalidation reply not cacheable, keeping stale entry"
                );
            }
        }
    }

    /// Cache tag for an upstream reply, and the storage decision when it may
    /// be cached.
    fn evaluate(
        &self,
        request: &RpcBody,
        status: u16,
        body: &[u8],
        ttl: u64,
    ) -> (CacheTag, Option<CacheDecision>) {
        if status != 200 {
            return (CacheTag::MissNoCacheHttpErr, None);
        }
        let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
            return (CacheTag::MissNoCacheNonJson, None);
        };

        let decision = self.policy.decide(request, &parsed, ttl);
        match (decision.cache, decision.reason) {
            (false, PolicyReason::RpcError) => (CacheTag::MissNoCacheRpcError, None),
            (false, _) => (CacheTag::MissNoCachePolicy, None),
            (true, PolicyReason::IncompleteTx) => {
                (CacheTag::MissCachedShortIncomplete, Some(decision))
            }
            (true, _) => (CacheTag::Miss, Some(decision)),
        }
    }
}

/// JSON-RPC request pipeline: policy, cache lookup, coalesced upstream fetch
/// and write-back.
#[derive(Clone)]
pub struct ProxyEngine {
    ctx: Arc<SharedContext>,
}

impl ProxyEngine {
    pub(crate) fn from_context(ctx: SharedContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        self.ctx.dispatcher.registry()
    }

    #[must_use]
    pub fn stats(&self) -> &StatsHandle {
        &self.ctx.stats
    }

    /// Coalescer diagnostics; entries include pending revalidations.
    #[must_use]
    pub fn inflight_stats(&self) -> CoalescerStats {
        let fetches = self.ctx.fetches.stats();
        CoalescerStats { entries: fetches.entries + self.ctx.revalidations.len(), ..fetches }
    }

    /// Handles one POSTed JSON-RPC body.
    ///
    /// # Errors
    ///
    /// [`ProxyError::EmptyBody`] and [`ProxyError::InvalidJson`] for bad input;
    /// [`ProxyError::Upstream`] when no upstream answered and no cached copy
    /// could stand in.
    pub async fn process(&self, raw: Bytes) -> Result<RpcReply, ProxyError> {
        let result = self.handle(raw).await;

        let tag = match &result {
            Ok(reply) => reply.tag,
            Err(e) => e.cache_tag(),
        };
        if let Some(tag) = tag {
            self.ctx.metrics.record_cache_tag(tag);
        }
        self.ctx.metrics.record_inflight(self.ctx.fetches.len(), self.ctx.revalidations.len());

        result
    }

    async fn handle(&self, raw: Bytes) -> Result<RpcReply, ProxyError> {
        if raw.is_empty() {
            return Err(ProxyError::EmptyBody);
        }
        let parsed: Value = serde_json::from_slice(&raw).map_err(|_| ProxyError::InvalidJson)?;
        let request = RpcBody::from_value(parsed);

        let methods = request.method_names();
        if !methods.is_empty() {
            self.ctx.stats.bump(StatsEvent::Methods { methods }).await;
        }

        let class = self.ctx.policy.classify(&request);
        if !class.cacheable {
            return self.bypass(raw, CacheTag::Bypass).await;
        }

        let key = match compute_key(&request) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "cache key computation failed, bypassing cache");
                return self.bypass(raw, CacheTag::BypassHashFail).await;
            }
        };

        let mut fallback = None;
        match self.ctx.cache.lookup(&key).await {
            Ok(Lookup::Fresh(entry)) => {
                self.ctx.stats.bump(StatsEvent::Cache { lane: CacheLane::Hit, n: 1 }).await;
                return Ok(self.cached(entry, CacheTag::Hit));
            }
            Ok(Lookup::Stale(entry)) => {
                self.ctx.stats.bump(StatsEvent::Cache { lane: CacheLane::Hit, n: 1 }).await;
                self.schedule_revalidation(&key, &request, raw, class.ttl);
                return Ok(self.cached(entry, CacheTag::Stale));
            }
            Ok(Lookup::Expired(entry)) => {
                if self.ctx.cache.fallback_usable(&entry) {
                    fallback = Some(entry);
                }
            }
            Ok(Lookup::Absent) => {}
            Err(e) => {
                warn!(cache_key = %key, error = %e, "cache read failed, bypassing cache");
                return self.bypass(raw, CacheTag::BypassCacheFail).await;
            }
        }

        let ctx = Arc::clone(&self.ctx);
        let producer_key = key.clone();
        let ttl = class.ttl;
        let fetched = self
            .ctx
            .fetches
            .get_or_create(key.as_str(), move || async move {
                ctx.fetch_and_store(producer_key, request, raw, ttl).await
            })
            .await
            .unwrap_or_else(|e| Err(UpstreamError::Network(e.to_string())));

        match fetched {
            Ok(f) => Ok(reply::miss(f.status, &f.content_type, f.body, f.ttl, &f.endpoint, f.tag)),
            Err(e) => match fallback {
                Some(entry) => {
                    info!(cache_key = %key, error = %e, "upstream failed, serving stale fallback");
                    Ok(self.cached(entry, CacheTag::StaleFallback))
                }
                None => Err(ProxyError::Upstream {
                    tag: CacheTag::MissUpstreamFail,
                    message: e.to_string(),
                }),
            },
        }
    }

    fn cached(&self, entry: crate::cache::CacheEntry, tag: CacheTag) -> RpcReply {
        let window = self.ctx.cache.store_window_seconds(entry.ttl_seconds);
        reply::cached(entry, tag, window)
    }

    fn schedule_revalidation(&self, key: &CacheKey, request: &RpcBody, raw: Bytes, ttl: u64) {
        let ctx = Arc::clone(&self.ctx);
        let producer_key = key.clone();
        let request = request.clone();
        let started = self.ctx.revalidations.spawn_detached(&key.revalidation_slot(), move || {
            async move { ctx.revalidate(producer_key, request, raw, ttl).await }
        });
        if started {
            debug!(cache_key = %key, "background revalidation scheduled");
        }
    }

    async fn bypass(&self, raw: Bytes, tag: CacheTag) -> Result<RpcReply, ProxyError> {
        self.ctx.stats.bump(StatsEvent::Cache { lane: CacheLane::Bypass, n: 1 }).await;
        match self.ctx.dispatcher.dispatch(raw).await {
            Ok(outcome) => Ok(reply::bypass(outcome, tag)),
            Err(e) => Err(ProxyError::Upstream {
                tag: CacheTag::BypassUpstreamFail,
                message: e.to_string(),
            }),
        }
    }
}
