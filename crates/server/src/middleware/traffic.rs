//! Per-lane request accounting.

use crate::{router::STATS_PING_PATH, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use sanctos_core::{
    stats::{StatsEvent, TrafficLane},
    types::headers::X_SANCTOS_INTERNAL,
};

/// True for the dashboard's own polling and the stats ping, neither of
/// which is counted.
fn is_internal(request: &Request<Body>) -> bool {
    if request.method() == Method::GET && request.uri().path() == STATS_PING_PATH {
        return true;
    }
    request
        .headers()
        .get(X_SANCTOS_INTERNAL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("dash"))
}

pub async fn traffic_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if method != Method::OPTIONS && !is_internal(&request) {
        let lane = TrafficLane::classify(method.as_str(), request.uri().path());
        let post = method == Method::POST;
        state.engine.stats().bump(StatsEvent::Traffic { lane, post }).await;
        state.metrics().record_traffic(lane);
    }

    next.run(request).await
}
