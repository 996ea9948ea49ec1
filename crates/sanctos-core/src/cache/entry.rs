use super::CacheError;
use bytes::Bytes;

/// Longest retention the backend is ever asked for.
pub const MAX_RETENTION_SECONDS: u64 = 3600;

/// A stored upstream reply plus the metadata needed to judge its age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub cached_at_ms: u64,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age <= ttl`
    Fresh,
    /// `ttl < age <= ttl + swr`
    Stale,
    Expired,
}

impl CacheEntry {
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.cached_at_ms)
    }

    #[must_use]
    pub fn freshness(&self, now_ms: u64, swr_window_seconds: u64) -> Freshness {
        let age = self.age_ms(now_ms);
        let ttl_ms = self.ttl_seconds.saturating_mul(1000);
        let stale_ms = ttl_ms.saturating_add(swr_window_seconds.saturating_mul(1000));

        if age <= ttl_ms {
            Freshness::Fresh
        } else if age <= stale_ms {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Rejects entries whose metadata cannot be aged.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] when the write timestamp or TTL is zero.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.cached_at_ms == 0 {
            return Err(CacheError::Corrupt("missing cached-at timestamp"));
        }
        if self.ttl_seconds == 0 {
            return Err(CacheError::Corrupt("missing ttl"));
        }
        Ok(())
    }
}

/// Backend retention for an entry: long enough to cover the stale window.
#[must_use]
pub fn retention_seconds(ttl_seconds: u64, swr_window_seconds: u64) -> u64 {
    ttl_seconds.saturating_add(swr_window_seconds).clamp(1, MAX_RETENTION_SECONDS)
}
