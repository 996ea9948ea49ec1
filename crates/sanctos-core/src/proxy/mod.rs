//! The JSON-RPC proxy pipeline.
//!
//! ```text
//! body ─► parse ─► classify ──not cacheable──► dispatch ─► BYPASS
//!                     │
//!                     ▼
//!                 cache key ─► lookup ─┬─ fresh ─────────────► HIT
//!                                      ├─ stale ─► revalidate ► STALE
//!                                      └─ expired/absent
//!                                             │
//!                                             ▼
//!                                 coalesced fetch ─► write-back ─► MISS*
//!                                             │
//!                                   failure ──┴─► STALE-FALLBACK | 502
//! ```

pub mod builder;
pub mod engine;
pub mod errors;
pub mod reply;

pub use builder::{BuilderError, ProxyEngineBuilder};
pub use engine::{ProxyEngine, SharedContext};
pub use errors::ProxyError;
pub use reply::RpcReply;
