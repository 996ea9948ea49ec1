//! Allow-listed passthrough to a separately hosted indexer service.
//!
//! Only `accept`, `content-type` and `user-agent` are forwarded, so client
//! cookies and credentials never reach the indexer. Every call is bounded by
//! the configured timeout.

use crate::{
    config::IndexerConfig,
    metrics::MetricsCollector,
    types::{headers, BUILD_ID, JSON_CONTENT_TYPE},
    upstream::{HttpClient, UpstreamError},
    utils::{set_header, strip_upstream_headers},
};
use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, ACCEPT, CONTENT_TYPE, USER_AGENT},
    Method,
};
use std::sync::Arc;
use thiserror::Error;

/// Headers copied from the client request.
const FORWARDED_HEADERS: [reqwest::header::HeaderName; 3] = [ACCEPT, CONTENT_TYPE, USER_AGENT];

#[derive(Debug, Clone)]
pub struct IndexerRequest {
    pub method: Method,
    /// Full request path, including the `/indexer` prefix.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct IndexerResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexerError {
    #[error("indexer_disabled")]
    Disabled,

    #[error("indexer_url_missing")]
    UrlMissing,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not Found")]
    PathNotAllowed,

    #[error("indexer timed out")]
    Timeout { base: String },

    #[error("indexer request failed: {message}")]
    Upstream { base: String, message: String },
}

impl IndexerError {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Disabled | Self::UrlMissing => 503,
            Self::MethodNotAllowed => 405,
            Self::PathNotAllowed => 404,
            Self::Timeout { .. } | Self::Upstream { .. } => 504,
        }
    }

    fn metric_outcome(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::UrlMissing => "misconfigured",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::PathNotAllowed => "path_not_allowed",
            Self::Timeout { .. } => "timeout",
            Self::Upstream { .. } => "error",
        }
    }

    #[must_use]
    pub fn into_response(self) -> IndexerResponse {
        let mut out = HeaderMap::new();
        set_header(&mut out, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);

        let body = match &self {
            Self::Disabled | Self::UrlMissing => {
                let marker = if self == Self::Disabled { "disabled" } else { "misconfigured" };
                set_header(&mut out, headers::X_SANCTOS_INDEXER, marker);
                set_header(&mut out, "content-type", JSON_CONTENT_TYPE);
                serde_json::json!({ "ok": false, "error": self.to_string() }).to_string()
            }
            Self::MethodNotAllowed | Self::PathNotAllowed => self.to_string(),
            Self::Timeout { base } | Self::Upstream { base, .. } => {
                set_header(&mut out, headers::X_SANCTOS_INDEXER, base);
                set_header(&mut out, headers::X_SANCTOS_INDEXER_STATUS, "timeout_or_error");
                "Indexer upstream error".to_string()
            }
        };

        IndexerResponse { status: self.status_code(), headers: out, body: Bytes::from(body) }
    }
}

pub struct IndexerProxy {
    config: IndexerConfig,
    client: Arc<HttpClient>,
    metrics: Arc<MetricsCollector>,
}

impl IndexerProxy {
    #[must_use]
    pub fn new(
        config: IndexerConfig,
        client: Arc<HttpClient>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { config, client, metrics }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Forwards a request, turning every failure into its HTTP reply.
    pub async fn handle(&self, request: IndexerRequest) -> IndexerResponse {
        match self.forward(request).await {
            Ok(response) => {
                self.metrics.record_indexer("ok");
                response
            }
            Err(e) => {
                self.metrics.record_indexer(e.metric_outcome());
                e.into_response()
            }
        }
    }

    /// # Errors
    ///
    /// Returns an [`IndexerError`] when the passthrough is disabled or
    /// misconfigured, the method or path is not allowed, or the indexer
    /// fails or times out.
    pub async fn forward(&self, request: IndexerRequest) -> Result<IndexerResponse, IndexerError> {
        if !self.config.is_enabled() {
            return Err(IndexerError::Disabled);
        }
        if !self.method_allowed(&request.method) {
            return Err(IndexerError::MethodNotAllowed);
        }
        let base = self.config.base_url().ok_or(IndexerError::UrlMissing)?;

        let rest = rest_path(&request.path);
        let allowed = &self.config.allowed_paths;
        if !allowed.is_empty() && !allowed.iter().any(|p| p == rest) {
            return Err(IndexerError::PathNotAllowed);
        }

        let mut target = format!("{base}{rest}");
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }

        let body = matches!(request.method, Method::POST | Method::PUT | Method::PATCH)
            .then_some(request.body);
        let timeout = self.config.timeout();
        let call = self.client.forward(
            request.method,
            &target,
            forward_headers(&request.headers),
            body,
            timeout,
        );

        let upstream = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(UpstreamError::Timeout)) | Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "indexer request timed out");
                return Err(IndexerError::Timeout { base });
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "indexer request failed");
                return Err(IndexerError::Upstream { base, message: e.to_string() });
            }
        };

        let mut out = strip_upstream_headers(&upstream.headers);
        set_header(&mut out, headers::X_SANCTOS_INDEXER, &base);
        set_header(&mut out, headers::X_SANCTOS_INDEXER_STATUS, upstream.status.to_string());
        set_header(&mut out, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);

        Ok(IndexerResponse { status: upstream.status, headers: out, body: upstream.body })
    }

    fn method_allowed(&self, method: &Method) -> bool {
        self.config.allowed_methods.iter().any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }
}

/// The part of `path` after the `/indexer` prefix, `/` when nothing remains.
#[must_use]
pub fn rest_path(path: &str) -> &str {
    let rest = match path.strip_prefix("/indexer") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    if rest.is_empty() {
        "/"
    } else {
        rest
    }
}

fn forward_headers(src: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = src.get(&name) {
            out.insert(name, value.clone());
        }
    }
    out
}
