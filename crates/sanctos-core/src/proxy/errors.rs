use super::RpcReply;
use crate::{
    types::{headers, CacheTag, BUILD_ID, JSON_CONTENT_TYPE},
    utils::set_header,
};
use bytes::Bytes;
use reqwest::header::HeaderMap;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Empty body")]
    EmptyBody,

    #[error("Invalid JSON")]
    InvalidJson,

    /// No upstream produced a reply and nothing could be served from cache.
    #[error("{message}")]
    Upstream { tag: CacheTag, message: String },
}

impl ProxyError {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyBody | Self::InvalidJson => 400,
            Self::Upstream { .. } => 502,
        }
    }

    #[must_use]
    pub fn cache_tag(&self) -> Option<CacheTag> {
        match self {
            Self::Upstream { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// JSON `{"error": ...}` reply for this failure.
    #[must_use]
    pub fn into_reply(self) -> RpcReply {
        let mut headers = HeaderMap::new();
        set_header(&mut headers, "content-type", JSON_CONTENT_TYPE);
        if let Some(tag) = self.cache_tag() {
            set_header(&mut headers, headers::X_SANCTOS_CACHE, tag.as_str());
            set_header(&mut headers, headers::X_SANCTOS_WORKER_BUILD, BUILD_ID);
        }
        let body = serde_json::json!({ "error": self.to_string() }).to_string();
        RpcReply {
            status: self.status_code(),
            headers,
            body: Bytes::from(body),
            tag: self.cache_tag(),
        }
    }
}
