//! Integration tests for the `ProxyEngine` request pipeline.
//!
//! Every test drives the engine through a scripted transport and a manual
//! clock, so cache ages are exact and no network is involved.

use crate::mock_infrastructure::{
    body_json, cache_tag, header, rpc_batch, rpc_call,
    scripted::{self, json_reply},
    test_helpers::{test_cache_config, FALLBACK, PRIMARY},
    TestEdge,
};
use async_trait::async_trait;
use bytes::Bytes;
use sanctos_core::{
    cache::{CacheEntry, CacheError, CacheKey, CacheStore},
    config::CacheConfig,
    proxy::ProxyError,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn test_empty_and_invalid_bodies_rejected() {
    let edge = TestEdge::new();

    let err = edge.engine.process(Bytes::new()).await.unwrap_err();
    assert_eq!(err, ProxyError::EmptyBody);
    assert_eq!(err.status_code(), 400);

    let err = edge.engine.process(Bytes::from_static(b"{not json")).await.unwrap_err();
    assert_eq!(err, ProxyError::InvalidJson);
    assert_eq!(edge.transport.total_calls(), 0);
}

#[tokio::test]
async fn test_miss_hit_stale_revalidate_timeline() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(250_000_000)));

    let first = edge.call("getSlot", json!([])).await;
    assert_eq!(first.status, 200);
    assert_eq!(cache_tag(&first), "MISS");
    assert_eq!(header(&first, "cache-control"), "public, max-age=8");
    assert_eq!(header(&first, "x-sanctos-upstream-status"), "200");
    assert_eq!(body_json(&first)["result"], json!(250_000_000));

    edge.advance_secs(5);
    let hit = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&hit), "HIT");
    assert_eq!(header(&hit, "x-sanctos-cache-ttl"), "8");
    assert_eq!(header(&hit, "cache-control"), "public, max-age=68");
    assert_eq!(hit.body, first.body);
    assert_eq!(edge.transport.total_calls(), 1);

    // Age 10s: past the TTL, inside the 60s stale window.
    edge.advance_secs(5);
    edge.transport.set(PRIMARY, scripted::constant(json!(250_000_020)));
    let stale = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&stale), "STALE");
    assert_eq!(body_json(&stale)["result"], json!(250_000_000));

    edge.settle().await;
    assert_eq!(edge.transport.total_calls(), 2);

    let refreshed = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&refreshed), "HIT");
    assert_eq!(body_json(&refreshed)["result"], json!(250_000_020));

    // Past TTL plus the stale window of the refreshed entry.
    edge.advance_secs(69);
    let expired = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&expired), "MISS");
    assert_eq!(edge.transport.total_calls(), 3);

    let snapshot = edge.snapshot().await;
    assert_eq!(snapshot.cache_hits, 3);
    assert_eq!(snapshot.cache_misses, 2);
    assert_eq!(snapshot.cache_bypass, 0);
    assert_eq!(snapshot.methods_all_time.get("getSlot"), Some(&5));
}

#[tokio::test]
async fn test_stale_requests_share_one_revalidation() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(1)));
    edge.call("getBlockHeight", json!([])).await;

    edge.advance_secs(20);
    edge.transport.set_delay(Duration::from_millis(50));
    for _ in 0..5 {
        assert_eq!(cache_tag(&edge.call("getBlockHeight", json!([])).await), "STALE");
    }
    edge.settle().await;
    assert_eq!(edge.transport.total_calls(), 2);
}

/// Serves a stale `getSlot` while every revalidation meets `failure`, then
/// checks the original entry survives until a refresh succeeds.
async fn assert_failed_revalidation_keeps_entry(failure: scripted::Responder) {
    let edge = TestEdge::with_config(vec![PRIMARY.to_string()], test_cache_config());
    edge.transport.set(PRIMARY, scripted::constant(json!(310_000_000)));
    let first = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&first), "MISS");

    edge.advance_secs(10);
    edge.transport.set(PRIMARY, failure);
    for attempt in 2..=3 {
        let stale = edge.call("getSlot", json!([])).await;
        assert_eq!(cache_tag(&stale), "STALE");
        assert_eq!(stale.body, first.body);
        edge.settle().await;
        assert_eq!(edge.transport.total_calls(), attempt);
    }

    edge.transport.set(PRIMARY, scripted::constant(json!(310_000_050)));
    let stale = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&stale), "STALE");
    assert_eq!(stale.body, first.body);
    edge.settle().await;

    let refreshed = edge.call("getSlot", json!([])).await;
    assert_eq!(cache_tag(&refreshed), "HIT");
    assert_eq!(body_json(&refreshed)["result"], json!(310_000_050));
    assert_eq!(edge.transport.total_calls(), 4);
}

#[tokio::test]
async fn test_revalidation_http_error_keeps_stale_entry() {
    assert_failed_revalidation_keeps_entry(scripted::status(500)).await;
}

#[tokio::test]
async fn test_revalidation_rpc_error_keeps_stale_entry() {
    assert_failed_revalidation_keeps_entry(scripted::rpc_error(-32005, "Node is behind")).await;
}

#[tokio::test]
async fn test_revalidation_transport_error_keeps_stale_entry() {
    assert_failed_revalidation_keeps_entry(scripted::fail()).await;
}

#[tokio::test]
async fn test_rpc_error_not_cached() {
    let edge = TestEdge::new();
    let not_found = scripted::rpc_error(-32602, "Invalid param: could not find account");
    edge.transport.set(PRIMARY, not_found);

    let first = edge.call("getAccountInfo", json!(["11111111111111111111111111111111"])).await;
    assert_eq!(first.status, 200);
    assert_eq!(cache_tag(&first), "MISS-NOCACHE-RPCERROR");
    assert_eq!(body_json(&first)["error"]["code"], json!(-32602));

    let second = edge.call("getAccountInfo", json!(["11111111111111111111111111111111"])).await;
    assert_eq!(cache_tag(&second), "MISS-NOCACHE-RPCERROR");
    assert_eq!(edge.transport.total_calls(), 2);
}

#[tokio::test]
async fn test_unindexed_transaction_cached_briefly() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(Value::Null));
    let signature = "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW";

    let first = edge.call("getTransaction", json!([signature, "json"])).await;
    assert_eq!(cache_tag(&first), "MISS-CACHED-SHORT-INCOMPLETE");

    let second = edge.call("getTransaction", json!([signature, "json"])).await;
    assert_eq!(cache_tag(&second), "HIT");
    assert_eq!(header(&second, "x-sanctos-cache-ttl"), "1");

    edge.advance_secs(2);
    let third = edge.call("getTransaction", json!([signature, "json"])).await;
    assert_eq!(cache_tag(&third), "STALE");
}

#[tokio::test]
async fn test_non_200_and_non_json_not_cached() {
    let edge = TestEdge::with_config(vec![PRIMARY.to_string()], test_cache_config());
    let params = json!(["Vote111111111111111111111111111111111111111"]);

    edge.transport.set(PRIMARY, scripted::status(500));
    let reply = edge.call("getBalance", params.clone()).await;
    assert_eq!(reply.status, 500);
    assert_eq!(cache_tag(&reply), "MISS-NOCACHE-HTTPERR");
    assert_eq!(header(&reply, "x-sanctos-upstream-status"), "500");

    edge.transport.set(PRIMARY, scripted::raw(200, "<html>maintenance</html>"));
    let reply = edge.call("getBalance", params.clone()).await;
    assert_eq!(cache_tag(&reply), "MISS-NOCACHE-NONJSON");

    edge.transport.set(PRIMARY, scripted::constant(json!({ "value": 42 })));
    let reply = edge.call("getBalance", params.clone()).await;
    assert_eq!(cache_tag(&reply), "MISS");
    assert_eq!(edge.transport.total_calls(), 3);
}

#[tokio::test]
async fn test_stale_fallback_when_upstreams_fail() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(7)));
    let original = edge.call("getSlot", json!([])).await;

    edge.transport.set(PRIMARY, scripted::fail());
    edge.transport.set(FALLBACK, scripted::fail());

    // Expired (age 100 > 8 + 60) but within the 300s fallback allowance.
    edge.advance_secs(100);
    let fallback = edge.call("getSlot", json!([])).await;
    assert_eq!(fallback.status, 200);
    assert_eq!(cache_tag(&fallback), "STALE-FALLBACK");
    assert_eq!(fallback.body, original.body);

    edge.advance_secs(269);
    let failed = edge.call("getSlot", json!([])).await;
    assert_eq!(failed.status, 502);
    assert_eq!(cache_tag(&failed), "MISS-UPSTREAM-FAIL");
    assert!(body_json(&failed)["error"].is_string());
}

#[tokio::test]
async fn test_stale_fallback_disabled() {
    let edge = TestEdge::with_cache(CacheConfig {
        stale_fallback_on_error: false,
        ..test_cache_config()
    });
    edge.transport.set(PRIMARY, scripted::constant(json!(7)));
    edge.call("getSlot", json!([])).await;

    edge.transport.set(PRIMARY, scripted::fail());
    edge.advance_secs(100);
    let reply = edge.call("getSlot", json!([])).await;
    assert_eq!(reply.status, 502);
    assert_eq!(cache_tag(&reply), "MISS-UPSTREAM-FAIL");
}

#[tokio::test]
async fn test_writes_and_sensitive_reads_bypass_cache() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!("sig")));

    for method in ["sendTransaction", "getLatestBlockhash", "getSignatureStatuses"] {
        let first = edge.call(method, json!(["AQAB"])).await;
        let second = edge.call(method, json!(["AQAB"])).await;
        assert_eq!(cache_tag(&first), "BYPASS", "{method}");
        assert_eq!(cache_tag(&second), "BYPASS", "{method}");
        assert!(header(&first, "cache-control").is_empty());
    }
    assert_eq!(edge.transport.total_calls(), 6);
    assert_eq!(edge.snapshot().await.cache_bypass, 6);
}

#[tokio::test]
async fn test_bypass_upstream_failure_is_502() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::fail());
    edge.transport.set(FALLBACK, scripted::fail());

    let reply = edge.call("sendTransaction", json!(["AQAB"])).await;
    assert_eq!(reply.status, 502);
    assert_eq!(cache_tag(&reply), "BYPASS-UPSTREAM-FAIL");
}

#[tokio::test]
async fn test_uncached_method_bypasses_unless_cache_all() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!({ "solana-core": "1.18.0" })));
    assert_eq!(cache_tag(&edge.call("getVersion", json!([])).await), "BYPASS");

    let edge = TestEdge::with_cache(CacheConfig {
        cache_all: true,
        default_ttl_seconds: 30,
        ..test_cache_config()
    });
    edge.transport.set(PRIMARY, scripted::constant(json!({ "solana-core": "1.18.0" })));
    let miss = edge.call("getVersion", json!([])).await;
    assert_eq!(cache_tag(&miss), "MISS");
    assert_eq!(header(&miss, "cache-control"), "public, max-age=30");
    assert_eq!(cache_tag(&edge.call("getVersion", json!([])).await), "HIT");
}

#[tokio::test]
async fn test_batch_cached_with_minimum_ttl() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(3)));

    let body = rpc_batch(&[("getSlot", json!([])), ("getBalance", json!(["addr"]))]);
    let first = edge.send(body.clone()).await;
    assert_eq!(cache_tag(&first), "MISS");
    assert_eq!(header(&first, "cache-control"), "public, max-age=6");
    assert_eq!(body_json(&first).as_array().map(Vec::len), Some(2));

    let second = edge.send(body).await;
    assert_eq!(cache_tag(&second), "HIT");
    assert_eq!(header(&second, "x-sanctos-cache-ttl"), "6");

    let snapshot = edge.snapshot().await;
    assert_eq!(snapshot.methods_all_time.get("getSlot"), Some(&2));
    assert_eq!(snapshot.methods_all_time.get("getBalance"), Some(&2));
}

#[tokio::test]
async fn test_batch_with_write_bypasses() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(3)));

    let body = rpc_batch(&[("getSlot", json!([])), ("sendTransaction", json!(["AQAB"]))]);
    assert_eq!(cache_tag(&edge.send(body).await), "BYPASS");
}

#[tokio::test]
async fn test_incomplete_batch_not_cached() {
    let edge = TestEdge::new();
    edge.transport.set(
        PRIMARY,
        Arc::new(|_| Ok(json_reply(200, &json!([{ "jsonrpc": "2.0", "id": 1, "result": 9 }])))),
    );

    let body = rpc_batch(&[("getSlot", json!([])), ("getBlockHeight", json!([]))]);
    let first = edge.send(body.clone()).await;
    assert_eq!(cache_tag(&first), "MISS-NOCACHE-POLICY");
    assert_eq!(cache_tag(&edge.send(body).await), "MISS-NOCACHE-POLICY");
    assert_eq!(edge.transport.total_calls(), 2);
}

#[tokio::test]
async fn test_single_call_and_batch_of_one_cached_apart() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(11)));

    assert_eq!(cache_tag(&edge.call("getSlot", json!([])).await), "MISS");
    let batch = edge.send(rpc_batch(&[("getSlot", json!([]))])).await;
    assert_eq!(cache_tag(&batch), "MISS");
    assert!(body_json(&batch).is_array());
}

#[tokio::test]
async fn test_request_id_does_not_split_cache() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(11)));

    edge.call("getSlot", json!([])).await;
    let other_id = json!({ "jsonrpc": "2.0", "id": "client-42", "method": "getSlot" });
    let other_id = Bytes::from(other_id.to_string());
    assert_eq!(cache_tag(&edge.send(other_id).await), "HIT");
}

#[tokio::test]
async fn test_concurrent_misses_coalesce() {
    let edge = Arc::new(TestEdge::new());
    edge.transport.set(PRIMARY, scripted::constant(json!({ "value": null })));
    edge.transport.set_delay(Duration::from_millis(100));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let edge = Arc::clone(&edge);
        handles.push(tokio::spawn(async move {
            edge.call("getAccountInfo", json!(["SysvarC1ock11111111111111111111111111111111"]))
                .await
        }));
    }
    for handle in handles {
        let reply = handle.await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(cache_tag(&reply), "MISS");
    }

    assert_eq!(edge.transport.total_calls(), 1);
    let inflight = edge.engine.inflight_stats();
    assert_eq!(inflight.created, 1);
    assert_eq!(inflight.joined, 7);
    assert_eq!(inflight.entries, 0);
    assert_eq!(edge.snapshot().await.cache_misses, 1);
}

#[tokio::test]
async fn test_coalesced_failure_reaches_every_caller() {
    let edge = Arc::new(TestEdge::new());
    edge.transport.set(PRIMARY, scripted::fail());
    edge.transport.set(FALLBACK, scripted::fail());
    edge.transport.set_delay(Duration::from_millis(50));

    let calls: Vec<_> = (0..4)
        .map(|_| {
            let edge = Arc::clone(&edge);
            tokio::spawn(async move { edge.call("getSlot", json!([])).await })
        })
        .collect();
    for call in calls {
        let reply = call.await.unwrap();
        assert_eq!(reply.status, 502);
        assert_eq!(cache_tag(&reply), "MISS-UPSTREAM-FAIL");
    }
    // One fetch walked both endpoints.
    assert_eq!(edge.transport.total_calls(), 2);
}

/// Store that always returns an entry with unusable metadata.
struct CorruptStore;

#[async_trait]
impl CacheStore for CorruptStore {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(Some(CacheEntry {
            status: 200,
            content_type: "application/json".to_string(),
            body: Bytes::from_static(b"{}"),
            cached_at_ms: 0,
            ttl_seconds: 0,
        }))
    }

    async fn put(
        &self,
        _key: &CacheKey,
        _entry: CacheEntry,
        _retain: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_corrupt_entry_bypasses_cache() {
    let edge = TestEdge::with_store(test_cache_config(), Arc::new(CorruptStore));
    edge.transport.set(PRIMARY, scripted::constant(json!(5)));

    let reply = edge.call("getSlot", json!([])).await;
    assert_eq!(reply.status, 200);
    assert_eq!(cache_tag(&reply), "BYPASS-CACHEFAIL");
    assert_eq!(body_json(&reply)["result"], json!(5));
}

#[tokio::test]
async fn test_miss_reply_reports_upstream() {
    let edge = TestEdge::new();
    edge.transport.set(PRIMARY, scripted::constant(json!(1)));

    let reply = edge.call("getSlot", json!([])).await;
    assert_eq!(header(&reply, "x-sanctos-upstream"), PRIMARY);
    assert_eq!(header(&reply, "x-sanctos-upstream-name"), "primary.rpc.test 1");
    assert!(header(&reply, "x-sanctos-worker-build").starts_with("sanctos-edge-"));
}

#[tokio::test]
async fn test_rpc_call_helper_builds_envelope() {
    let body: Value = serde_json::from_slice(&rpc_call("getSlot", json!([]))).unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["method"], "getSlot");
}
