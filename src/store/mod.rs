//! Counter storage for the distributed rate limit path.
//!
//! The shared store is an external collaborator reached over the network.
//! This module defines the port the distributed backend drives, the bucket
//! key layout, and an in-process implementation used for single-node
//! deployments and tests.

mod memory;

pub use memory::MemoryCounterStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::ratelimit::{SubjectKey, Window};

/// Errors surfaced by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    /// The operation did not complete within its budget.
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

/// Key of one epoch-aligned counter bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Whom the bucket counts.
    pub subject: SubjectKey,
    /// Which window the bucket belongs to.
    pub window: Window,
    /// Epoch-aligned bucket id, `now / window length`.
    pub bucket: u64,
}

impl BucketKey {
    /// The bucket containing `now` for a subject and window.
    pub fn at(subject: &SubjectKey, window: Window, now: u64) -> Self {
        Self {
            subject: subject.clone(),
            window,
            bucket: window.bucket(now),
        }
    }

    /// Expiry a store should apply when incrementing this bucket.
    ///
    /// One full window length: by the time an untouched bucket expires, the
    /// window has rolled over and a new bucket id is in use.
    pub fn ttl(&self) -> Duration {
        self.window.duration()
    }

    /// Convert to a storage key string.
    ///
    /// Format: `rl|{subject_type}|{subject_value}|{window}|{bucket}`
    pub fn storage_key(&self) -> String {
        format!(
            "rl|{}|{}|{}|{}",
            self.subject.subject_type, self.subject.value, self.window, self.bucket
        )
    }
}

/// Port to the shared counter store backing the distributed rate limiter.
///
/// `incr` must behave as an atomic batch: every bucket is incremented by one
/// and its expiry refreshed to [`BucketKey::ttl`] in the same round trip. A
/// read-then-write split would race concurrent checkers and undercount.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment every bucket and return the resulting counts, in key order.
    async fn incr(&self, buckets: &[BucketKey]) -> Result<Vec<u64>, StoreError>;

    /// Read current counts without incrementing. Missing buckets read as zero.
    async fn get(&self, buckets: &[BucketKey]) -> Result<Vec<u64>, StoreError>;
}
