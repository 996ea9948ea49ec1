use crate::{
    dashboard::handle_dash,
    middleware::{cors_middleware, create_request_id_layers, traffic_middleware, CorsPolicy},
    router::{
        handle_health, handle_metrics, handle_rpc, handle_stats_ping, handle_unmatched,
        STATS_PING_PATH,
    },
    state::AppState,
};
use axum::{
    http::{header, HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::{any::Any, sync::Arc};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, limit::RequestBodyLimitLayer,
};

/// Last-resort reply for a handler that panicked.
#[allow(clippy::needless_pass_by_value)]
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown");
    tracing::error!(panic = detail, "request handler panicked");

    let mut response =
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Edge error: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Builds the edge router with its full middleware stack.
///
/// Named routes that only answer `GET` hand every other method to the RPC
/// handler, so `POST` to any path is proxied.
pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let cors = Arc::new(CorsPolicy::new(&config.cors, Arc::clone(&state.instance_id)));
    let (set_request_id, propagate_request_id) = create_request_id_layers();

    let mut router = Router::new()
        .route("/", any(handle_rpc))
        .route("/health", get(handle_health).fallback(handle_rpc))
        .route("/__sanctos_health", get(handle_health).fallback(handle_rpc))
        .route(STATS_PING_PATH, get(handle_stats_ping).fallback(handle_rpc))
        .route("/dash", get(handle_dash).fallback(handle_rpc));

    if config.metrics.enabled {
        router = router.route("/metrics", get(handle_metrics).fallback(handle_rpc));
    }

    router
        .fallback(handle_unmatched)
        .with_state(state.clone())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(axum_middleware::from_fn_with_state(state, traffic_middleware))
        .layer(axum_middleware::from_fn_with_state(cors, cors_middleware))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(CompressionLayer::new())
        .layer(propagate_request_id)
        .layer(set_request_id)
}
