use serde::{Deserialize, Serialize};

/// Number of one-second slots, and the width of the rolling window.
pub const RATE_SLOTS: usize = 60;

/// Circular per-second counter over the last minute.
///
/// Slot `i` holds the count for the second whose `sec % 60 == i`, tagged with
/// that second. A write to a slot carrying an older stamp resets it first, so
/// stale counts from a previous lap are never summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBucket {
    buckets: Vec<u64>,
    stamps: Vec<u64>,
}

impl Default for RateBucket {
    fn default() -> Self {
        Self { buckets: vec![0; RATE_SLOTS], stamps: vec![0; RATE_SLOTS] }
    }
}

fn slot(sec: u64) -> usize {
    (sec % RATE_SLOTS as u64) as usize
}

impl RateBucket {
    pub fn bump(&mut self, now_sec: u64, inc: u64) {
        self.normalize();
        let i = slot(now_sec);
        if self.stamps[i] != now_sec {
            self.stamps[i] = now_sec;
            self.buckets[i] = 0;
        }
        self.buckets[i] += inc;
    }

    /// Count of events in the 60 seconds ending at `now_sec` (inclusive).
    #[must_use]
    pub fn sum_last_60(&self, now_sec: u64) -> u64 {
        self.buckets
            .iter()
            .zip(&self.stamps)
            .filter(|&(_, &stamp)| stamp <= now_sec && now_sec - stamp < RATE_SLOTS as u64)
            .map(|(count, _)| *count)
            .sum()
    }

    /// Per-second counts where element `k` is the count recorded at `now_sec - k`.
    #[must_use]
    pub fn series_last_60(&self, now_sec: u64) -> Vec<u64> {
        (0..RATE_SLOTS as u64)
            .map(|k| {
                let Some(sec) = now_sec.checked_sub(k) else {
                    return 0;
                };
                let i = slot(sec);
                match (self.stamps.get(i), self.buckets.get(i)) {
                    (Some(&stamp), Some(&count)) if stamp == sec => count,
                    _ => 0,
                }
            })
            .collect()
    }

    /// Repairs slot vectors of the wrong length, e.g. after loading a
    /// hand-edited state file.
    pub fn normalize(&mut self) {
        if self.buckets.len() != RATE_SLOTS || self.stamps.len() != RATE_SLOTS {
            self.buckets.resize(RATE_SLOTS, 0);
            self.stamps.resize(RATE_SLOTS, 0);
        }
    }
}
