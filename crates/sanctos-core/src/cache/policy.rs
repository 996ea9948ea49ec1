//! Method classification and response-driven cache eligibility.
//!
//! Cacheability is a fixed lookup over method names: writes and
//! freshness-sensitive reads are never cached, known reads carry a per-method
//! TTL, and everything else is cached only when cache-all mode is on.

use crate::types::{call_method, RpcBody};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Methods that mutate chain state or request funds.
pub const WRITE_METHODS: &[&str] =
    &["sendTransaction", "sendRawTransaction", "simulateTransaction", "requestAirdrop"];

/// Reads whose answers go stale too quickly to be shared.
pub const SENSITIVE_METHODS: &[&str] = &["getLatestBlockhash", "getSignatureStatuses"];

/// Transaction lookups that may legitimately return `null` until indexed.
pub const TRANSACTION_LOOKUP_METHODS: &[&str] = &["getTransaction", "getParsedTransaction"];

/// TTL applied when a transaction lookup has not been indexed yet.
pub const INCOMPLETE_TX_TTL_SECONDS: u64 = 1;

/// Fixed TTL table, in seconds.
#[must_use]
pub fn method_ttl(method: &str) -> Option<u64> {
    let ttl = match method {
        "getBlockHeight" | "getSlot" => 8,
        "getSignaturesForAddress" | "getAccountInfo" => 2,
        "getTransaction" | "getParsedTransaction" => 60 * 60 * 24 * 3,
        "getMultipleAccounts" | "getBalance" => 6,
        "getProgramAccounts" => 5,
        "getTokenAccountsByOwner" => 10,
        _ => return None,
    };
    Some(ttl)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Write,
    Sensitive,
    /// Cacheable with the given TTL in seconds.
    Cached(u64),
    Uncached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub cacheable: bool,
    /// Minimum TTL across the calls; zero when not cacheable.
    pub ttl: u64,
}

impl Classification {
    const NOT_CACHEABLE: Self = Self { cacheable: false, ttl: 0 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyReason {
    Ok,
    RpcError,
    IncompleteTx,
    IncompleteBatch,
}

impl PolicyReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RpcError => "rpc_error",
            Self::IncompleteTx => "incomplete_tx",
            Self::IncompleteBatch => "incomplete_batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDecision {
    pub cache: bool,
    pub ttl: u64,
    pub reason: PolicyReason,
}

impl CacheDecision {
    fn reject(reason: PolicyReason) -> Self {
        Self { cache: false, ttl: 0, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    cache_all: bool,
    default_ttl: u64,
}

impl CachePolicy {
    #[must_use]
    pub fn new(cache_all: bool, default_ttl: u64) -> Self {
        Self { cache_all, default_ttl }
    }

    #[must_use]
    pub fn classify_method(&self, method: &str) -> MethodClass {
        if WRITE_METHODS.contains(&method) {
            return MethodClass::Write;
        }
        if SENSITIVE_METHODS.contains(&method) {
            return MethodClass::Sensitive;
        }
        match method_ttl(method) {
            Some(ttl) => MethodClass::Cached(ttl),
            None if self.cache_all => MethodClass::Cached(self.default_ttl),
            None => MethodClass::Uncached,
        }
    }

    /// A request is cacheable only when every call is; the TTL is the
    /// smallest per-call TTL.
    #[must_use]
    pub fn classify(&self, body: &RpcBody) -> Classification {
        let calls = body.calls();
        if calls.is_empty() {
            return Classification::NOT_CACHEABLE;
        }

        let mut ttl = u64::MAX;
        for call in calls {
            let Some(method) = call_method(call) else {
                return Classification::NOT_CACHEABLE;
            };
            match self.classify_method(method) {
                MethodClass::Cached(t) if t > 0 => ttl = ttl.min(t),
                _ => return Classification::NOT_CACHEABLE,
            }
        }

        Classification { cacheable: true, ttl }
    }

    /// Decides whether an upstream response may be stored, and for how long.
    ///
    /// Any JSON-RPC error in the response rejects the whole request. A
    /// transaction lookup that resolved to `null` caps the TTL at one second.
    /// A batch response that does not answer every call is not stored.
    #[must_use]
    pub fn decide(&self, request: &RpcBody, response: &Value, base_ttl: u64) -> CacheDecision {
        if has_rpc_error(response) {
            return CacheDecision::reject(PolicyReason::RpcError);
        }

        let responses: &[Value] = match (request, response) {
            (RpcBody::Batch(_), Value::Array(items)) => items,
            (RpcBody::Single(_), Value::Array(_)) | (RpcBody::Batch(_), _) => {
                return CacheDecision::reject(PolicyReason::IncompleteBatch);
            }
            (RpcBody::Single(_), single) => std::slice::from_ref(single),
        };

        let Some(pairs) = pair_responses(request.calls(), responses) else {
            return CacheDecision::reject(PolicyReason::IncompleteBatch);
        };

        let mut ttl = base_ttl.max(1);
        let mut reason = PolicyReason::Ok;
        for (call, reply) in pairs {
            let is_tx_lookup =
                call_method(call).is_some_and(|m| TRANSACTION_LOOKUP_METHODS.contains(&m));
            if is_tx_lookup && reply.get("result").map_or(true, Value::is_null) {
                ttl = ttl.min(INCOMPLETE_TX_TTL_SECONDS);
                reason = PolicyReason::IncompleteTx;
            }
        }

        CacheDecision { cache: true, ttl, reason }
    }
}

/// True when any entry of a (possibly batched) response carries an `error`
/// or is not a response object at all.
#[must_use]
pub fn has_rpc_error(response: &Value) -> bool {
    let entries = match response {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    entries.iter().any(|entry| match entry {
        Value::Object(map) => map.get("error").is_some_and(|e| !e.is_null()),
        _ => true,
    })
}

/// Matches each request call to its response.
///
/// When every call has a distinct non-null `id` the response is matched by
/// id, since servers may reorder batch replies. Otherwise responses are
/// matched by position. Returns `None` when some call has no answer.
fn pair_responses<'a>(
    calls: &'a [Value],
    responses: &'a [Value],
) -> Option<Vec<(&'a Value, &'a Value)>> {
    if responses.len() < calls.len() {
        return None;
    }

    if calls.len() > 1 {
        let ids: Vec<Option<String>> = calls.iter().map(id_key).collect();
        let unique: HashSet<&String> = ids.iter().flatten().collect();
        if unique.len() == calls.len() {
            let by_id: HashMap<String, &Value> =
                responses.iter().filter_map(|r| id_key(r).map(|k| (k, r))).collect();
            return calls
                .iter()
                .zip(ids)
                .map(|(call, id)| id.and_then(|id| by_id.get(&id).map(|r| (call, *r))))
                .collect();
        }
    }

    Some(calls.iter().zip(responses.iter()).collect())
}

fn id_key(value: &Value) -> Option<String> {
    value.get("id").filter(|id| !id.is_null()).map(ToString::to_string)
}
