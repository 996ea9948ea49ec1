//! HTTP surface of the SanctOS RPC edge node.
//!
//! [`create_app`] assembles the router: the JSON-RPC endpoint, health and
//! dashboard routes, the indexer passthrough and `/metrics`, wrapped in the
//! CORS, traffic-accounting, limit and correlation-id layers.

pub mod app;
pub mod dashboard;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::create_app;
pub use state::AppState;
