use serde_json::Value;
use std::fmt;

/// Build identifier reported in `x-sanctos-worker-build` and the health payload.
pub const BUILD_ID: &str = concat!("sanctos-edge-", env!("CARGO_PKG_VERSION"));

/// Response header names emitted by the edge node.
pub mod headers {
    pub const X_SANCTOS_CACHE: &str = "x-sanctos-cache";
    pub const X_SANCTOS_UPSTREAM: &str = "x-sanctos-upstream";
    pub const X_SANCTOS_UPSTREAM_NAME: &str = "x-sanctos-upstream-name";
    pub const X_SANCTOS_UPSTREAM_STATUS: &str = "x-sanctos-upstream-status";
    pub const X_SANCTOS_WORKER_BUILD: &str = "x-sanctos-worker-build";
    pub const X_SANCTOS_INSTANCE: &str = "x-sanctos-instance";
    pub const X_SANCTOS_INDEXER: &str = "x-sanctos-indexer";
    pub const X_SANCTOS_INDEXER_STATUS: &str = "x-sanctos-indexer-status";
    pub const X_SANCTOS_CACHED_AT: &str = "x-sanctos-cached-at";
    pub const X_SANCTOS_CACHE_TTL: &str = "x-sanctos-cache-ttl";
    pub const X_SANCTOS_HEALTH: &str = "x-sanctos-health";
    pub const X_SANCTOS_INTERNAL: &str = "x-sanctos-internal";

    /// Headers exposed to browsers when no explicit list is configured.
    pub const DEFAULT_EXPOSE: &[&str] = &[
        X_SANCTOS_CACHE,
        X_SANCTOS_UPSTREAM_NAME,
        X_SANCTOS_UPSTREAM_STATUS,
        X_SANCTOS_UPSTREAM,
        X_SANCTOS_WORKER_BUILD,
        X_SANCTOS_INSTANCE,
        X_SANCTOS_INDEXER,
        X_SANCTOS_INDEXER_STATUS,
        X_SANCTOS_CACHED_AT,
        X_SANCTOS_CACHE_TTL,
    ];
}

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A parsed JSON-RPC request body.
///
/// Calls are kept as raw JSON values: the proxy forwards the original bytes
/// and only inspects `method`, `params` and `id`, so a call that is not a
/// well-formed object still has to flow through (it just never caches).
#[derive(Debug, Clone, PartialEq)]
pub enum RpcBody {
    Single(Value),
    Batch(Vec<Value>),
}

impl RpcBody {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(calls) => Self::Batch(calls),
            other => Self::Single(other),
        }
    }

    #[must_use]
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    #[must_use]
    pub fn calls(&self) -> &[Value] {
        match self {
            Self::Single(call) => std::slice::from_ref(call),
            Self::Batch(calls) => calls,
        }
    }

    /// Method name of every call, `None` where a call has no string `method`.
    #[must_use]
    pub fn methods(&self) -> Vec<Option<&str>> {
        self.calls().iter().map(call_method).collect()
    }

    /// Method names that are present, in call order.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        self.calls().iter().filter_map(call_method).map(str::to_string).collect()
    }
}

#[must_use]
pub fn call_method(call: &Value) -> Option<&str> {
    call.get("method").and_then(Value::as_str).filter(|m| !m.is_empty())
}

/// Cache disposition reported to the client in `x-sanctos-cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Hit,
    Stale,
    StaleFallback,
    Miss,
    MissCachedShortIncomplete,
    MissNoCacheRpcError,
    MissNoCachePolicy,
    MissNoCacheNonJson,
    MissNoCacheHttpErr,
    MissUpstreamFail,
    Bypass,
    BypassHashFail,
    BypassCacheFail,
    BypassUpstreamFail,
}

impl CacheTag {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Stale => "STALE",
            Self::StaleFallback => "STALE-FALLBACK",
            Self::Miss => "MISS",
            Self::MissCachedShortIncomplete => "MISS-CACHED-SHORT-INCOMPLETE",
            Self::MissNoCacheRpcError => "MISS-NOCACHE-RPCERROR",
            Self::MissNoCachePolicy => "MISS-NOCACHE-POLICY",
            Self::MissNoCacheNonJson => "MISS-NOCACHE-NONJSON",
            Self::MissNoCacheHttpErr => "MISS-NOCACHE-HTTPERR",
            Self::MissUpstreamFail => "MISS-UPSTREAM-FAIL",
            Self::Bypass => "BYPASS",
            Self::BypassHashFail => "BYPASS-HASHFAIL",
            Self::BypassCacheFail => "BYPASS-CACHEFAIL",
            Self::BypassUpstreamFail => "BYPASS-UPSTREAM-FAIL",
        }
    }

    /// Whether the reply body came out of the cache store.
    #[must_use]
    pub fn served_from_cache(&self) -> bool {
        matches!(self, Self::Hit | Self::Stale | Self::StaleFallback)
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
