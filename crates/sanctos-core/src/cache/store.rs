//! Byte-store backends for cached replies.

use super::{CacheEntry, CacheError, CacheKey};
use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use std::time::{Duration, Instant};

/// Shared key/value store holding serialized replies.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `entry`, replacing any previous value, and keeps it for at most `retain`.
    async fn put(&self, key: &CacheKey, entry: CacheEntry, retain: Duration)
        -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Stored {
    entry: CacheEntry,
    retain: Duration,
}

struct RetainExpiry;

impl Expiry<String, Stored> for RetainExpiry {
    fn expire_after_create(&self, _key: &String, value: &Stored, _at: Instant) -> Option<Duration> {
        Some(value.retain)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.retain)
    }
}

#[allow(clippy::ptr_arg)]
fn weigh(key: &String, value: &Stored) -> u32 {
    let bytes = key.len() + value.entry.content_type.len() + value.entry.body.len();
    u32::try_from(bytes).unwrap_or(u32::MAX)
}

/// In-process store backed by a `moka` cache bounded by reply size, with
/// per-entry expiry.
pub struct MokaCacheStore {
    inner: Cache<String, Stored>,
}

impl MokaCacheStore {
    /// A store holding at most `max_bytes` of keys and reply bodies. A reply
    /// larger than the whole budget is never kept.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(weigh)
            .expire_after(RetainExpiry)
            .build();
        Self { inner }
    }

    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Total weight of the stored entries, in bytes.
    #[must_use]
    pub fn weighted_size(&self) -> u64 {
        self.inner.weighted_size()
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.inner.get(key.as_str()).await.map(|stored| stored.entry))
    }

    async fn put(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        retain: Duration,
    ) -> Result<(), CacheError> {
        self.inner.insert(key.as_str().to_string(), Stored { entry, retain }).await;
        Ok(())
    }
}
