//! Response cache: key derivation, method policy, and the stale-while-revalidate
//! store.

pub mod entry;
pub mod key;
pub mod policy;
pub mod store;
pub mod swr;

pub use entry::{retention_seconds, CacheEntry, Freshness};
pub use key::{compute_key, CacheKey, KeyError};
pub use policy::{CacheDecision, CachePolicy, Classification, MethodClass, PolicyReason};
pub use store::{CacheStore, MokaCacheStore};
pub use swr::{Lookup, SwrCache, SwrSettings};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("corrupt cache entry: {0}")]
    Corrupt(&'static str),
}
