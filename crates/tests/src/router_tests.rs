//! Full HTTP surface: middleware stack, JSON-RPC proxying, health, and the
//! indexer passthrough, driven with `oneshot` against mockito upstreams.

use crate::mock_infrastructure::{rpc_call, test_helpers::T0_MS, RpcMockBuilder};
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use mockito::Server;
use sanctos_core::{
    config::{AppConfig, CacheConfig},
    indexer::IndexerProxy,
    metrics::MetricsCollector,
    proxy::ProxyEngineBuilder,
    stats::{spawn_stats_actor, MemoryStatsStorage},
    upstream::{HttpClient, UpstreamRegistry},
    utils::{ManualClock, SharedClock},
};
use serde_json::{json, Value};
use server::{create_app, AppState};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    _stats_task: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn new(upstreams: Vec<String>, mut config: AppConfig) -> Self {
        config.cache = CacheConfig { sync_write: true, ..config.cache };
        let clock: SharedClock = ManualClock::shared(T0_MS);
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let client = Arc::new(HttpClient::new().unwrap());
        let (stats, stats_task) = spawn_stats_actor(
            Arc::new(MemoryStatsStorage::new()),
            Arc::clone(&clock),
            &config.stats,
        );

        let engine = ProxyEngineBuilder::new()
            .registry(Arc::new(UpstreamRegistry::from_urls(upstreams, &config.upstreams.aliases)))
            .http_client(Arc::clone(&client))
            .upstreams_config(&config.upstreams)
            .cache_config(config.cache.clone())
            .stats(stats)
            .clock(Arc::clone(&clock))
            .metrics(Arc::clone(&metrics))
            .build()
            .unwrap();
        let indexer = Arc::new(IndexerProxy::new(config.indexer.clone(), client, metrics));
        let app = create_app(AppState::new(engine, indexer, Arc::new(config), clock));

        Self { app, _stats_task: stats_task }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn rpc(&self, method: &str, params: Value) -> Response {
        self.send(
            Request::post("/")
                .header("content-type", "application/json")
                .header("origin", "https://app.sanctos.example")
                .body(Body::from(rpc_call(method, params)))
                .unwrap(),
        )
        .await
    }

    async fn health(&self, internal: bool) -> Value {
        let mut request = Request::get("/__sanctos_health");
        if internal {
            request = request.header("x-sanctos-internal", "dash");
        }
        let response = self.send(request.body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header(response: &Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_rpc_miss_then_hit_over_http() {
    let mut upstream = RpcMockBuilder::new().await;
    upstream.mock_result("getSlot", json!(280_000_000), Some(1)).await;
    let harness = Harness::new(vec![upstream.url()], AppConfig::default());

    let first = harness.rpc("getSlot", json!([])).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-sanctos-cache"), "MISS");
    assert_eq!(header(&first, "access-control-allow-origin"), "https://app.sanctos.example");
    assert!(header(&first, "access-control-expose-headers").contains("x-sanctos-cache"));
    assert!(first.headers().get("set-cookie").is_none());
    assert!(!header(&first, "x-request-id").is_empty());

    let second = harness.rpc("getSlot", json!([])).await;
    assert_eq!(header(&second, "x-sanctos-cache"), "HIT");
    assert_eq!(body_json(second).await["result"], json!(280_000_000));

    upstream.assert_all().await;
}

#[tokio::test]
async fn test_health_counts_exclude_dashboard_polling() {
    let mut upstream = RpcMockBuilder::new().await;
    upstream.mock_result("getBalance", json!({ "value": 1 }), None).await;
    upstream.mock_result("sendTransaction", json!("sig"), None).await;
    let harness = Harness::new(vec![upstream.url()], AppConfig::default());

    harness.rpc("getBalance", json!(["addr"])).await;
    harness.rpc("getBalance", json!(["addr"])).await;
    harness.rpc("sendTransaction", json!(["AQAB"])).await;
    harness.health(true).await;
    harness.health(true).await;

    let health = harness.health(false).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["stats"]["totalRequests"], json!(4));
    assert_eq!(health["stats"]["totalPostRequests"], json!(3));
    assert_eq!(health["stats"]["cacheHits"], json!(1));
    assert_eq!(health["stats"]["cacheMisses"], json!(1));
    assert_eq!(health["stats"]["cacheBypass"], json!(1));
    assert_eq!(health["stats"]["traffic"]["totals"]["rpcPost"], json!(3));
    assert_eq!(health["stats"]["traffic"]["totals"]["healthGet"], json!(1));
    assert_eq!(health["stats"]["traffic"]["last60"]["rpcPost"], json!(3));
    assert_eq!(health["stats"]["lastUpstreamStatus"], json!(200));
    assert_eq!(health["methods"]["allTimeCounts"]["getBalance"], json!(2));
    assert_eq!(health["methods"]["today"], "2024-01-01");
    assert_eq!(health["env"]["upstreams"], json!(["127.0.0.1 1"]));
}

#[tokio::test]
async fn test_health_redacts_upstream_keys() {
    let harness = Harness::new(
        vec![
            "https://mainnet.helius-rpc.com/?api-key=0b7e1c2d-secret".to_string(),
            "https://solana-mainnet.quiknode.pro/0123456789abcdef0123/".to_string(),
        ],
        AppConfig::default(),
    );

    let health = harness.health(false).await;
    let urls = health["env"]["upstreamUrlsRedacted"].to_string();
    assert!(urls.contains("api-key=REDACTED"), "{urls}");
    assert!(!urls.contains("0b7e1c2d-secret"));
    assert!(!urls.contains("0123456789abcdef0123"));
    assert_eq!(health["env"]["upstreams"][0], "helius 1");
}

#[tokio::test]
async fn test_stats_ping_reaches_actor() {
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], AppConfig::default());

    let response =
        harness.send(Request::get("/__sanctos_do_ping").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["do"]["startTime"], json!(T0_MS));
}

#[tokio::test]
async fn test_upstream_failure_is_502_json() {
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], AppConfig::default());

    let response = harness.rpc("getSlot", json!([])).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header(&response, "x-sanctos-cache"), "MISS-UPSTREAM-FAIL");
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = AppConfig::default();
    config.server.max_body_bytes = 64;
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], config);

    let big = "x".repeat(256);
    let response = harness
        .send(
            Request::post("/")
                .body(Body::from(format!(r#"{{"method":"getSlot","params":["{big}"]}}"#)))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_indexer_passthrough() {
    let mut indexer = Server::new_async().await;
    let mock = indexer
        .mock("GET", "/v1/messages")
        .match_query(mockito::Matcher::UrlEncoded("chat".into(), "abc".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "indexer=1")
        .with_body(r#"{"messages":[]}"#)
        .create_async()
        .await;

    let mut config = AppConfig::default();
    config.indexer.url = Some(format!("{}/", indexer.url()));
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], config);

    let response = harness
        .send(Request::get("/indexer/v1/messages?chat=abc").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-sanctos-indexer"), indexer.url());
    assert_eq!(header(&response, "x-sanctos-indexer-status"), "200");
    assert!(response.headers().get("set-cookie").is_none());
    assert_eq!(body_json(response).await, json!({ "messages": [] }));
    mock.assert_async().await;

    let rejected =
        harness.send(Request::post("/indexer/v1/messages").body(Body::from("{}")).unwrap()).await;
    assert_eq!(rejected.status(), StatusCode::METHOD_NOT_ALLOWED);

    let health = harness.health(false).await;
    assert_eq!(health["env"]["indexerEnabled"], json!(true));
    assert_eq!(health["stats"]["traffic"]["totals"]["indexerGet"], json!(1));
    assert_eq!(health["stats"]["traffic"]["totals"]["indexerPost"], json!(1));
}

#[tokio::test]
async fn test_indexer_never_receives_truncated_body() {
    let mut indexer = Server::new_async().await;
    let mock = indexer.mock("POST", mockito::Matcher::Any).expect(0).create_async().await;

    let mut config = AppConfig::default();
    config.indexer.url = Some(indexer.url());
    config.indexer.allowed_methods = vec!["GET".to_string(), "POST".to_string()];
    config.server.max_body_bytes = 16;
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], config);

    // Chunked, so the size is only discovered while reading.
    let chunks = (0..2).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![b'a'; 32])));
    let response = harness
        .send(
            Request::post("/indexer/v1/send")
                .header("origin", "https://app.sanctos.example")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(header(&response, "access-control-allow-origin"), "https://app.sanctos.example");
    assert_eq!(body_json(response).await, json!({ "error": "Unable to read request body" }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_declared_oversized_body_keeps_cors_headers() {
    let mut config = AppConfig::default();
    config.server.max_body_bytes = 64;
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], config);

    let response = harness
        .send(
            Request::post("/")
                .header("origin", "https://app.sanctos.example")
                .header("content-length", "4096")
                .body(Body::from(vec![b' '; 4096]))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(header(&response, "access-control-allow-origin"), "https://app.sanctos.example");
    assert!(!header(&response, "x-sanctos-instance").is_empty());
}

#[tokio::test]
async fn test_stats_ping_is_not_counted_as_traffic() {
    let harness = Harness::new(vec!["http://127.0.0.1:9".to_string()], AppConfig::default());

    for _ in 0..3 {
        let response =
            harness.send(Request::get("/__sanctos_do_ping").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let health = harness.health(false).await;
    assert_eq!(health["stats"]["totalRequests"], json!(1));
    assert_eq!(health["stats"]["traffic"]["totals"]["otherGet"], json!(0));
    assert_eq!(health["stats"]["traffic"]["totals"]["healthGet"], json!(1));
}
