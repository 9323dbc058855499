//! Rate limiter backed by a shared counter store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::store::{BucketKey, CounterStore, StoreError};

use super::backend::RateLimiterBackend;
use super::config::RateLimitConfig;
use super::result::{RateLimitResult, RateLimitStatus, WindowUsage};
use super::subject::SubjectKey;
use super::window::{unix_now, Window};

/// Rate limiter whose counts live in a shared store.
///
/// Every consulted window gets one epoch-aligned bucket per subject; a check
/// increments all of them in a single batched round trip, refreshing each
/// bucket's expiry to its window length. Store failures are returned to the
/// caller: whether to fall back or fail open is the service's decision, not
/// this backend's.
pub struct DistributedRateLimiter {
    /// The store holding the counters.
    store: Arc<dyn CounterStore>,
}

impl DistributedRateLimiter {
    /// Create a limiter on top of a counter store.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Check and consume one slot for a subject.
    pub async fn check(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, StoreError> {
        self.check_at(subject, config, unix_now().as_secs()).await
    }

    /// Report usage without consuming a slot.
    pub async fn status(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitStatus, StoreError> {
        self.status_at(subject, config, unix_now().as_secs()).await
    }

    async fn check_at(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
        now: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let consulted: Vec<(Window, u32)> = config.consulted_windows().collect();
        if consulted.is_empty() {
            // Every window is unlimited; skip the round trip entirely.
            return Ok(RateLimitResult::allowed(
                u32::MAX,
                Window::Minute.next_boundary(now),
            ));
        }

        let buckets: Vec<BucketKey> = consulted
            .iter()
            .map(|&(window, _)| BucketKey::at(subject, window, now))
            .collect();

        trace!(subject = %subject, windows = consulted.len(), "Checking distributed rate limit");
        let counts = self.store.incr(&buckets).await?;

        // The first over-budget window in minute, hour, day order is the
        // smallest one, and its rollover is the soonest useful retry hint.
        for (&(window, limit), &count) in consulted.iter().zip(&counts) {
            if count > u64::from(limit) {
                let retry_after = window.remaining_secs(now);
                debug!(
                    subject = %subject,
                    window = %window,
                    count,
                    limit,
                    "Distributed rate limit exceeded"
                );
                return Ok(RateLimitResult::denied(now + retry_after, retry_after));
            }
        }

        let remaining = consulted
            .iter()
            .zip(&counts)
            .map(|(&(_, limit), &count)| {
                limit.saturating_sub(u32::try_from(count).unwrap_or(u32::MAX))
            })
            .min()
            .unwrap_or(u32::MAX);

        Ok(RateLimitResult::allowed(
            remaining,
            Window::Minute.next_boundary(now),
        ))
    }

    async fn status_at(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
        now: u64,
    ) -> Result<RateLimitStatus, StoreError> {
        let consulted: Vec<(Window, u32)> = config.consulted_windows().collect();
        let mut status = RateLimitStatus::new(subject.clone());
        if consulted.is_empty() {
            return Ok(status);
        }

        let buckets: Vec<BucketKey> = consulted
            .iter()
            .map(|&(window, _)| BucketKey::at(subject, window, now))
            .collect();
        let counts = self.store.get(&buckets).await?;

        for ((window, limit), count) in consulted.into_iter().zip(counts) {
            status.windows.insert(window, WindowUsage::new(count, limit));
        }
        Ok(status)
    }
}

#[async_trait]
impl RateLimiterBackend for DistributedRateLimiter {
    async fn check(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, StoreError> {
        self.check(subject, config).await
    }

    async fn status(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitStatus, StoreError> {
        self.status(subject, config).await
    }
}
