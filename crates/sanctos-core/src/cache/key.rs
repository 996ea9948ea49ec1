use crate::{
    types::{call_method, RpcBody},
    utils::canonical_json::{canonical_sha256_hex, CanonicalError},
};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Hex SHA-256 over the canonical form of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the background refresh for this entry is coalesced.
    #[must_use]
    pub fn revalidation_slot(&self) -> String {
        format!("reval:{}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("failed to canonicalize request: {0}")]
    Canonicalize(#[from] CanonicalError),
}

/// Computes the cache key for a request body.
///
/// Each call is reduced to `{method, params}`; `id` and `jsonrpc` are dropped
/// and missing params default to `[]`. A single call and a one-element batch
/// get different keys because their responses have different shapes.
///
/// # Errors
///
/// Returns [`KeyError`] if the request cannot be canonicalized.
pub fn compute_key(body: &RpcBody) -> Result<CacheKey, KeyError> {
    let calls: Vec<Value> = body
        .calls()
        .iter()
        .map(|call| {
            let method = call_method(call).unwrap_or_default();
            let params = call.get("params").cloned().unwrap_or_else(|| json!([]));
            json!({ "method": method, "params": params })
        })
        .collect();

    let canonical = json!({ "batch": body.is_batch(), "calls": calls });
    Ok(CacheKey(canonical_sha256_hex(&canonical)?))
}
