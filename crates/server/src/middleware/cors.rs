//! CORS handling shared by every route.
//!
//! The edge node answers preflight itself for any path, echoes the request
//! origin only when it is allow-listed, and stamps every response with the
//! per-process instance id.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sanctos_core::{
    config::CorsConfig,
    types::headers::{DEFAULT_EXPOSE, X_SANCTOS_INSTANCE},
};
use std::sync::Arc;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "content-type,accept,solana-client";
const MAX_AGE: &str = "86400";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_any: bool,
    allow_origins: Vec<String>,
    expose_headers: String,
    instance_id: Arc<str>,
}

impl CorsPolicy {
    #[must_use]
    pub fn new(config: &CorsConfig, instance_id: Arc<str>) -> Self {
        let allow_origins: Vec<String> = config
            .allow_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let expose_headers = if config.expose_headers.is_empty() {
            DEFAULT_EXPOSE.join(", ")
        } else {
            config.expose_headers.join(", ")
        };

        Self {
            allow_any: allow_origins.iter().any(|o| o == "*"),
            allow_origins,
            expose_headers,
            instance_id,
        }
    }

    /// The origin to echo back, if the request has one that is allowed.
    #[must_use]
    pub fn pick_origin<'a>(&self, request_headers: &'a HeaderMap) -> Option<&'a str> {
        let origin = request_headers.get(header::ORIGIN)?.to_str().ok()?;
        if origin.is_empty() {
            return None;
        }
        (self.allow_any || self.allow_origins.iter().any(|o| o == origin)).then_some(origin)
    }

    fn apply(&self, origin: Option<&str>, requested_headers: Option<&str>, out: &mut HeaderMap) {
        if let Some(origin) = origin.and_then(|o| HeaderValue::from_str(o).ok()) {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            out.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            );
            let allow_headers = requested_headers
                .and_then(|h| HeaderValue::from_str(h).ok())
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));
            out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
            out.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));
            out.insert(header::VARY, HeaderValue::from_static("Origin"));
        }

        if let Ok(expose) = HeaderValue::from_str(&self.expose_headers) {
            out.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose);
        }
        if let Ok(instance) = HeaderValue::from_str(&self.instance_id) {
            out.insert(X_SANCTOS_INSTANCE, instance);
        }
    }
}

/// Answers `OPTIONS` with 204 and decorates every other response.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = policy.pick_origin(request.headers()).map(str::to_string);
    let requested_headers = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    policy.apply(origin.as_deref(), requested_headers.as_deref(), response.headers_mut());
    response
}
