//! HTTP middleware for the edge server.

pub mod correlation_id;
pub mod cors;
pub mod security;
pub mod traffic;

pub use correlation_id::{
    create_request_id_layers, request_id, UuidRequestIdGenerator, X_REQUEST_ID,
};
pub use cors::{cors_middleware, CorsPolicy};
pub use security::apply_security_headers;
pub use traffic::traffic_middleware;
