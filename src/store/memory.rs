//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Instant;

use super::{BucketKey, CounterStore, StoreError};

/// An in-process [`CounterStore`].
///
/// Used for single-node deployments and as the store double in tests. Buckets
/// expire lazily: an expired entry reads as absent and is reset the next time
/// it is incremented. [`purge_expired`](Self::purge_expired) sweeps the whole
/// map for callers that want memory reclaimed between touches.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    buckets: DashMap<String, BucketEntry>,
}

#[derive(Debug, Clone, Copy)]
struct BucketEntry {
    count: u64,
    expires_at: Instant,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.buckets
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Whether no live buckets exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired bucket.
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    fn purge_expired_at(&self, now: Instant) {
        self.buckets.retain(|_, entry| entry.expires_at > now);
    }

    fn incr_at(&self, buckets: &[BucketKey], now: Instant) -> Vec<u64> {
        let mut counts = Vec::with_capacity(buckets.len());
        for key in buckets {
            let mut entry = self
                .buckets
                .entry(key.storage_key())
                .or_insert(BucketEntry {
                    count: 0,
                    expires_at: now + key.ttl(),
                });
            if entry.expires_at <= now {
                // Stale leftover from a bucket id that has since rotated.
                entry.count = 0;
            }
            entry.count += 1;
            entry.expires_at = now + key.ttl();
            counts.push(entry.count);
        }
        counts
    }

    fn get_at(&self, buckets: &[BucketKey], now: Instant) -> Vec<u64> {
        buckets
            .iter()
            .map(|key| {
                self.buckets
                    .get(&key.storage_key())
                    .filter(|entry| entry.expires_at > now)
                    .map(|entry| entry.count)
                    .unwrap_or(0)
            })
            .collect()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, buckets: &[BucketKey]) -> Result<Vec<u64>, StoreError> {
        Ok(self.incr_at(buckets, Instant::now()))
    }

    async fn get(&self, buckets: &[BucketKey]) -> Result<Vec<u64>, StoreError> {
        Ok(self.get_at(buckets, Instant::now()))
    }
}
