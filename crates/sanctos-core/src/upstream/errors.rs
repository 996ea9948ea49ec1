use thiserror::Error;

/// Failures talking to an upstream.
///
/// `Clone` so a single coalesced failure can be handed to every caller
/// waiting on it. Messages never carry the upstream URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Concurrency limit reached")]
    ConcurrencyLimit,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("No upstream available")]
    NoUpstreamAvailable,
}

impl UpstreamError {
    /// Short machine-friendly category, used as a metrics label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::Network(_) => "network",
            Self::ConcurrencyLimit => "concurrency_limit",
            Self::ClientBuild(_) => "client_build",
            Self::NoUpstreamAvailable => "no_upstream",
        }
    }
}
