use crate::{middleware::request_id, state::AppState};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use sanctos_core::{
    indexer::{IndexerRequest, IndexerResponse},
    proxy::RpcReply,
    types::{
        headers::{X_SANCTOS_HEALTH, X_SANCTOS_WORKER_BUILD},
        BUILD_ID, JSON_CONTENT_TYPE,
    },
};
use serde_json::{json, Value};
use tracing::debug;

pub const BANNER: &str = "SanctOS RPC Edge Node. POST JSON-RPC only.\n";
pub const STATS_PING_PATH: &str = "/__sanctos_do_ping";

fn json_response(status: StatusCode, body: &Value, extra: &[(&'static str, &str)]) -> Response {
    let mut response = (status, body.to_string()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    for (name, value) in extra {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(*name, value);
        }
    }
    response
}

fn reply_response(reply: RpcReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, reply.headers, reply.body).into_response()
}

fn indexer_response(reply: IndexerResponse) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::GATEWAY_TIMEOUT);
    (status, reply.headers, reply.body).into_response()
}

fn banner() -> Response {
    let mut response = (StatusCode::OK, BANNER).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn unreadable_body(headers: &HeaderMap, rejection: &BytesRejection) -> Response {
    debug!(request_id = request_id(headers), error = %rejection, "unable to read request body");
    json_response(rejection.status(), &json!({ "error": "Unable to read request body" }), &[])
}

async fn rpc(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if *method != Method::POST {
        return banner();
    }
    let raw = match body {
        Ok(raw) => raw,
        Err(e) => return unreadable_body(headers, &e),
    };

    match state.engine.process(raw).await {
        Ok(reply) => {
            debug!(
                request_id = request_id(headers),
                cache = reply.tag.map_or("-", |t| t.as_str()),
                status = reply.status,
                "rpc handled"
            );
            reply_response(reply)
        }
        Err(e) => {
            debug!(request_id = request_id(headers), error = %e, "rpc rejected");
            reply_response(e.into_reply())
        }
    }
}

/// JSON-RPC endpoint. Anything but `POST` gets the usage banner.
pub async fn handle_rpc(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    rpc(&state, &method, &headers, body).await
}

/// Routes paths without an explicit route: `/indexer/...` goes to the
/// indexer passthrough, everything else to the RPC handler. A body that
/// cannot be read in full is never forwarded.
pub async fn handle_unmatched(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let path = uri.path();
    if path != "/indexer" && !path.starts_with("/indexer/") {
        return rpc(&state, &method, &headers, body).await;
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => return unreadable_body(&headers, &e),
    };
    let request = IndexerRequest {
        method,
        path: path.to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };
    indexer_response(state.indexer.handle(request).await)
}

/// `GET /health` and `GET /__sanctos_health`.
pub async fn handle_health(State(state): State<AppState>) -> Response {
    let snapshot = state.engine.stats().get_or_degraded().await;
    let inflight = state.engine.inflight_stats();
    let registry = state.engine.registry();
    let config = &state.config;

    let uptime_sec = state.clock.now_ms().saturating_sub(snapshot.start_time) / 1000;
    let status = if snapshot.degraded { "degraded" } else { "ok" };

    let payload = json!({
        "status": status,
        "uptimeSec": uptime_sec,
        "env": {
            "workerBuild": BUILD_ID,
            "cacheAll": config.cache.cache_all,
            "defaultTTL": config.cache.default_ttl_seconds,
            "upstreams": registry.labels(),
            "upstreamUrlsRedacted": registry.redacted_urls(),
            "indexerUrl": config.indexer.base_url(),
            "indexerEnabled": config.indexer.is_enabled(),
        },
        "stats": {
            "totalRequests": snapshot.total_requests,
            "totalPostRequests": snapshot.total_post_requests,
            "cacheHits": snapshot.cache_hits,
            "cacheMisses": snapshot.cache_misses,
            "cacheBypass": snapshot.cache_bypass,
            "inflightEntries": inflight.entries,
            "inflightJoined": inflight.joined,
            "inflightCreated": inflight.created,
            "inflightMax": inflight.max,
            "lastUpstreamOkAt": snapshot.last_upstream_ok_at,
            "lastUpstreamUrl": snapshot.last_upstream_url,
            "lastUpstreamName": snapshot.last_upstream_name,
            "lastUpstreamStatus": snapshot.last_upstream_status,
            "lastUpstreamErrorAt": snapshot.last_upstream_error_at,
            "lastUpstreamError": snapshot.last_upstream_error,
            "traffic": snapshot.traffic,
        },
        "methods": {
            "today": snapshot.today,
            "todayCounts": snapshot.today_counts,
            "allTimeCounts": snapshot.methods_all_time,
            "byDay": snapshot.methods_by_day,
        },
    });

    json_response(
        StatusCode::OK,
        &payload,
        &[(X_SANCTOS_HEALTH, "1"), (X_SANCTOS_WORKER_BUILD, BUILD_ID)],
    )
}

/// `GET /__sanctos_do_ping`: round-trips a message through the stats actor.
pub async fn handle_stats_ping(State(state): State<AppState>) -> Response {
    match state.engine.stats().ping().await {
        Ok(reply) => json_response(
            StatusCode::OK,
            &json!({ "ok": true, "do": reply }),
            &[(X_SANCTOS_WORKER_BUILD, BUILD_ID)],
        ),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({ "ok": false, "error": e.to_string() }),
            &[(X_SANCTOS_WORKER_BUILD, BUILD_ID)],
        ),
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics().get_prometheus_metrics(),
    )
}
