//! Static operator dashboard served at `/dash`.
//!
//! The page holds no server-side state: it polls `/__sanctos_health` every
//! five seconds with `x-sanctos-internal: dash` so its own traffic is not
//! counted.

use crate::middleware::apply_security_headers;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sanctos_core::types::{headers::X_SANCTOS_WORKER_BUILD, BUILD_ID};

pub const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// `GET /dash`. axum answers `HEAD` from the same handler without a body.
#[allow(clippy::unused_async)]
pub async fn handle_dash() -> Response {
    let mut response = (StatusCode::OK, DASHBOARD_HTML).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(X_SANCTOS_WORKER_BUILD, HeaderValue::from_static(BUILD_ID));
    apply_security_headers(headers, true);
    response
}
