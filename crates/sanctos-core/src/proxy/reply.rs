use crate::{
    cache::CacheEntry,
    types::{headers, CacheTag, BUILD_ID, JSON_CONTENT_TYPE},
    upstream::{DispatchOutcome, UpstreamEndpoint},
    utils::{set_header, strip_upstream_headers},
};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

/// Response produced by the RPC engine, ready to be written to the client.
#[derive(Debug, Clone)]
pub struct RpcReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub tag: Option<CacheTag>,
}

/// A reply served out of the cache store.
pub(crate) fn cached(entry: CacheEntry, tag: CacheTag, store_window_seconds: u64) -> RpcReply {
    let mut headers = HeaderMap::new();
    set_header(&mut headers, "content-type", &entry.content_type);
    set_header(&mut headers, "cache-control", format!("public, max-age={store_window_seconds}"));
    set_header(&mut headers, headers::X_SANCTOS_CACHED_AT, entry.cached_at_ms.to_string());
    set_header(&mut headers, headers::X_SANCTOS_CACHE_TTL, entry.ttl_seconds.to_string());
    set_header(&mut headers, headers::X_SANCTOS_CACHE, tag.as_str());
    set_header(&mut headers, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);
    RpcReply { status: entry.status, headers, body: entry.body, tag: Some(tag) }
}

/// A fresh upstream reply on the cacheable path.
pub(crate) fn miss(
    status: u16,
    content_type: &str,
    body: Bytes,
    ttl_seconds: u64,
    endpoint: &UpstreamEndpoint,
    tag: CacheTag,
) -> RpcReply {
    let mut headers = HeaderMap::new();
    set_header(&mut headers, "content-type", content_type);
    set_header(&mut headers, "cache-control", format!("public, max-age={ttl_seconds}"));
    set_upstream_headers(&mut headers, endpoint, status);
    set_header(&mut headers, headers::X_SANCTOS_CACHE, tag.as_str());
    set_header(&mut headers, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);
    RpcReply { status, headers, body, tag: Some(tag) }
}

/// An upstream reply passed through without caching. Upstream headers are
/// kept except those that would leak or conflict.
pub(crate) fn bypass(outcome: DispatchOutcome, tag: CacheTag) -> RpcReply {
    let DispatchOutcome { response, endpoint, .. } = outcome;
    let mut headers = strip_upstream_headers(&response.headers);
    set_header(&mut headers, headers::X_SANCTOS_CACHE, tag.as_str());
    set_upstream_headers(&mut headers, &endpoint, response.status);
    set_header(&mut headers, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);
    if !headers.contains_key(CONTENT_TYPE) {
        set_header(&mut headers, "content-type", JSON_CONTENT_TYPE);
    }
    RpcReply { status: response.status, headers, body: response.body, tag: Some(tag) }
}

fn set_upstream_headers(headers: &mut HeaderMap, endpoint: &UpstreamEndpoint, status: u16) {
    set_header(headers, headers::X_SANCTOS_UPSTREAM, endpoint.redacted_url());
    set_header(headers, headers::X_SANCTOS_UPSTREAM_NAME, &endpoint.label);
    set_header(headers, headers::X_SANCTOS_UPSTREAM_STATUS, status.to_string());
}
