//! Per-process coalescing of identical in-flight upstream fetches.
//!
//! The first caller for a key starts the producer on a detached task and
//! publishes a shared handle to its result; every caller that arrives before
//! the result settles awaits the same handle. Running the producer detached
//! means a follower still gets its answer (and the cache write still happens)
//! if the caller that started it goes away.
//!
//! # Slot lifecycle
//!
//! ```text
//! absent ──get_or_create──► pending(id) ──producer settles──► absent
//!                              ▲   │
//!                     joiners ─┘   └─ removed only if the slot still holds `id`
//! ```

use dashmap::{mapref::entry::Entry, DashMap};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use serde::Serialize;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoalescerError {
    /// The producer task ended without delivering a result (it panicked or
    /// the runtime is shutting down).
    #[error("inflight producer ended without a result")]
    ProducerLost,
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, CoalescerError>>>;

struct Slot<T> {
    id: u64,
    result: SharedResult<T>,
}

/// Removes the slot it was created for when dropped, including on panic.
struct SlotGuard<T> {
    slots: Arc<DashMap<String, Slot<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.slots.remove_if(&self.key, |_, slot| slot.id == id);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoalescerStats {
    pub entries: usize,
    pub created: u64,
    pub joined: u64,
    pub max: usize,
}

pub struct InflightCoalescer<T> {
    slots: Arc<DashMap<String, Slot<T>>>,
    next_id: AtomicU64,
    created: AtomicU64,
    joined: AtomicU64,
    high_water: AtomicUsize,
}

impl<T> Default for InflightCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InflightCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Returns the result for `key`, invoking `producer` only if no fetch for
    /// `key` is already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CoalescerError::ProducerLost`] if the producer task died
    /// before settling.
    pub async fn get_or_create<F, Fut>(&self, key: &str, producer: F) -> Result<T, CoalescerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (result, _) = self.join_or_start(key, producer, true);
        result.await
    }

    /// Starts `producer` for `key` in the background unless one is already
    /// running. Returns `true` when a new producer was started.
    pub fn spawn_detached<F, Fut>(&self, key: &str, producer: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (_, started) = self.join_or_start(key, producer, false);
        started
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            entries: self.slots.len(),
            created: self.created.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            max: self.high_water.load(Ordering::Relaxed),
        }
    }

    fn join_or_start<F, Fut>(&self, key: &str, producer: F, track: bool) -> (SharedResult<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (id, result, tx) = match self.slots.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                if track {
                    self.joined.fetch_add(1, Ordering::Relaxed);
                }
                return (slot.get().result.clone(), false);
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<T>();
                let result: SharedResult<T> =
                    rx.map(|r| r.map_err(|_| CoalescerError::ProducerLost)).boxed().shared();
                vacant.insert(Slot { id, result: result.clone() });
                (id, result, tx)
            }
        };

        // The shard lock is released above; `len` would deadlock while holding it.
        if track {
            self.created.fetch_add(1, Ordering::Relaxed);
            self.high_water.fetch_max(self.slots.len(), Ordering::Relaxed);
        }

        let guard = SlotGuard { slots: Arc::clone(&self.slots), key: key.to_string(), id };
        let work = producer();
        tokio::spawn(async move {
            let output = work.await;
            drop(guard);
            let _ = tx.send(output);
        });

        (result, true)
    }
}
