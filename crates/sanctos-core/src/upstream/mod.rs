//! Upstream RPC endpoints: resolution, the shared HTTP client, and ordered
//! failover dispatch.

pub mod dispatcher;
pub mod errors;
pub mod http_client;
pub mod registry;

pub use dispatcher::{DispatchOutcome, HttpTransport, UpstreamDispatcher, UpstreamTransport};
pub use errors::UpstreamError;
pub use http_client::{HttpClient, HttpClientConfig, UpstreamResponse};
pub use registry::{
    compute_labels, detect_provider_name, normalize_upstream_url, UpstreamEndpoint,
    UpstreamRegistry, DEFAULT_UPSTREAM,
};
