//! Stale-while-revalidate view over a [`CacheStore`].
//!
//! Entries age through fresh, stale and expired windows measured from their
//! write timestamp. The store is asked to retain an entry for
//! `min(3600, ttl + swr)` seconds, plus the stale-fallback grace when
//! fallback is enabled, so stale and fallback reads can still find it.

use super::{
    entry::{retention_seconds, Freshness},
    CacheEntry, CacheError, CacheKey, CacheStore,
};
use crate::{config::CacheConfig, utils::SharedClock};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwrSettings {
    pub swr_window_seconds: u64,
    pub stale_fallback: bool,
    pub stale_fallback_max_age_seconds: u64,
    pub sync_write: bool,
}

impl From<&CacheConfig> for SwrSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            swr_window_seconds: config.swr_window_seconds,
            stale_fallback: config.stale_fallback_on_error,
            stale_fallback_max_age_seconds: config.stale_fallback_max_age_seconds,
            sync_write: config.sync_write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    /// Past the stale window; only usable as an error fallback.
    Expired(CacheEntry),
    Absent,
}

#[derive(Clone)]
pub struct SwrCache {
    store: Arc<dyn CacheStore>,
    clock: SharedClock,
    settings: SwrSettings,
}

impl SwrCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: SharedClock, settings: SwrSettings) -> Self {
        Self { store, clock, settings }
    }

    #[must_use]
    pub fn settings(&self) -> SwrSettings {
        self.settings
    }

    /// Reads `key` and classifies it by age.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails or the stored metadata is corrupt.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Lookup, CacheError> {
        let Some(entry) = self.store.get(key).await? else {
            return Ok(Lookup::Absent);
        };
        entry.validate()?;

        let lookup = match entry.freshness(self.clock.now_ms(), self.settings.swr_window_seconds) {
            Freshness::Fresh => Lookup::Fresh(entry),
            Freshness::Stale => Lookup::Stale(entry),
            Freshness::Expired => Lookup::Expired(entry),
        };
        Ok(lookup)
    }

    /// Whether an expired entry may still be served after an upstream failure.
    #[must_use]
    pub fn fallback_usable(&self, entry: &CacheEntry) -> bool {
        if !self.settings.stale_fallback {
            return false;
        }
        let limit_secs = entry
            .ttl_seconds
            .saturating_add(self.settings.swr_window_seconds)
            .saturating_add(self.settings.stale_fallback_max_age_seconds);
        entry.age_ms(self.clock.now_ms()) <= limit_secs.saturating_mul(1000)
    }

    /// Builds an entry stamped with the current time.
    #[must_use]
    pub fn new_entry(
        &self,
        status: u16,
        content_type: impl Into<String>,
        body: Bytes,
        ttl_seconds: u64,
    ) -> CacheEntry {
        CacheEntry {
            status,
            content_type: content_type.into(),
            body,
            cached_at_ms: self.clock.now_ms(),
            ttl_seconds,
        }
    }

    /// Seconds a client may treat a stored entry as cacheable.
    #[must_use]
    pub fn store_window_seconds(&self, ttl_seconds: u64) -> u64 {
        retention_seconds(ttl_seconds, self.settings.swr_window_seconds)
    }

    /// Backend retention for an entry with the given TTL.
    #[must_use]
    pub fn retention(&self, ttl_seconds: u64) -> Duration {
        let mut secs = self.store_window_seconds(ttl_seconds);
        if self.settings.stale_fallback {
            secs = secs.saturating_add(self.settings.stale_fallback_max_age_seconds);
        }
        Duration::from_secs(secs)
    }

    /// Stores `entry` under `key`. Never fails the caller.
    ///
    /// In synchronous mode the write is awaited; otherwise it is handed to a
    /// detached task and this returns immediately.
    pub async fn write_back(&self, key: CacheKey, entry: CacheEntry) {
        let retain = self.retention(entry.ttl_seconds);
        if self.settings.sync_write {
            put_logged(self.store.as_ref(), &key, entry, retain).await;
        } else {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                put_logged(store.as_ref(), &key, entry, retain).await;
            });
        }
    }
}

async fn put_logged(store: &dyn CacheStore, key: &CacheKey, entry: CacheEntry, retain: Duration) {
    let ttl = entry.ttl_seconds;
    match store.put(key, entry, retain).await {
        Ok(()) => {
            let retain_secs = retain.as_secs();
            debug!(cache_key = %key, ttl_seconds = ttl, retain_secs, "cache entry stored");
        }
        Err(e) => {
            warn!(cache_key = %key, error = %e, "cache write failed");
        }
    }
}
