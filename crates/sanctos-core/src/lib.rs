//! # SanctOS Core
//!
//! Core library for the SanctOS RPC edge node, a caching reverse proxy in
//! front of one or more Solana JSON-RPC providers.
//!
//! - **[`cache`]**: Request keying, per-method TTL policy, and the
//!   stale-while-revalidate store.
//!
//! - **[`coalescer`]**: Collapses identical in-flight upstream fetches into one.
//!
//! - **[`upstream`]**: Upstream registry, pooled HTTP client, and the
//!   primary/fallback dispatcher with rate-limit cooldown.
//!
//! - **[`proxy`]**: The request engine tying cache, coalescer and dispatcher together.
//!
//! - **[`stats`]**: Single-owner traffic, cache and upstream counters behind an actor.
//!
//! - **[`indexer`]**: Allow-listed passthrough to an external indexer service.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ProxyEngine                        │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────┐  │
//! │  │   SwrCache   │  │ InflightCoalescer│  │ StatsHandle│  │
//! │  └──────┬───────┘  └────────┬─────────┘  └─────┬──────┘  │
//! │         │                   │                  │         │
//! │  ┌──────▼───────┐  ┌────────▼─────────┐  ┌─────▼──────┐  │
//! │  │ MokaCacheStore│ │UpstreamDispatcher│  │ StatsActor │  │
//! │  └──────────────┘  └──────────────────┘  └────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod coalescer;
pub mod config;
pub mod indexer;
pub mod metrics;
pub mod proxy;
pub mod stats;
pub mod types;
pub mod upstream;
pub mod utils;
