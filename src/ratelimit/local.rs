//! In-process sliding-window rate limiter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::config::RateLimitConfig;
use super::result::{RateLimitResult, RateLimitStatus, WindowUsage};
use super::subject::SubjectKey;
use super::window::{unix_now, Window};

/// Rate limiter backed by per-subject request logs in process memory.
///
/// Needs no round trips, so it can afford a true sliding window instead of
/// bucketed counts: each check prunes timestamps older than
/// `window_size_secs` and compares what is left against the minute threshold.
/// Counts are lost on restart and not shared across instances.
pub struct LocalRateLimiter {
    /// Request logs keyed by subject. One coarse lock: the prune, compare
    /// and append sequence must be atomic under concurrent checks.
    log: Mutex<HashMap<SubjectKey, Vec<Duration>>>,
}

impl LocalRateLimiter {
    /// Create a limiter with no recorded requests.
    pub fn new() -> Self {
        Self {
            log: Mutex::new(HashMap::new()),
        }
    }

    /// Number of subjects currently tracked.
    pub fn subject_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Check and consume one slot for a subject.
    pub fn check(&self, subject: &SubjectKey, config: &RateLimitConfig) -> RateLimitResult {
        self.check_at(subject, config, unix_now())
    }

    /// Report usage without consuming a slot.
    pub fn status(&self, subject: &SubjectKey, config: &RateLimitConfig) -> RateLimitStatus {
        self.status_at(subject, config, unix_now())
    }

    /// Prune every subject against `horizon` and drop the ones left empty.
    ///
    /// Checks already prune the subjects they touch; this reclaims memory
    /// held by subjects that stopped sending requests.
    pub fn evict_idle(&self, horizon: Duration) {
        self.evict_idle_at(horizon, unix_now());
    }

    fn check_at(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
        now: Duration,
    ) -> RateLimitResult {
        let limit = config.requests_per_minute;
        let window = Duration::from_secs(config.window_size_secs);
        let reset_time = (now + window).as_secs();

        if limit == 0 {
            // Unlimited; nothing to record.
            return RateLimitResult::allowed(u32::MAX, reset_time);
        }

        let mut log = self.log.lock();
        let entries = log.entry(subject.clone()).or_insert_with(|| {
            debug!(subject = %subject, "Tracking new rate limit subject");
            Vec::new()
        });
        let cutoff = now.saturating_sub(window);
        entries.retain(|&stamp| stamp > cutoff);

        let count = entries.len();
        trace!(subject = %subject, count, limit, "Checking local rate limit");
        if count >= limit as usize {
            debug!(subject = %subject, count, limit, "Local rate limit exceeded");
            return RateLimitResult::denied(reset_time, window.as_secs());
        }

        entries.push(now);
        // count < limit, so the subtraction cannot underflow.
        RateLimitResult::allowed(limit - count as u32 - 1, reset_time)
    }

    fn status_at(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
        now: Duration,
    ) -> RateLimitStatus {
        let window = Duration::from_secs(config.window_size_secs);
        let cutoff = now.saturating_sub(window);

        let mut log = self.log.lock();
        let count = match log.get_mut(subject) {
            Some(entries) => {
                entries.retain(|&stamp| stamp > cutoff);
                if entries.is_empty() {
                    // A subject with no live entries is dropped entirely.
                    log.remove(subject);
                    0
                } else {
                    entries.len() as u64
                }
            }
            None => 0,
        };

        let mut status = RateLimitStatus::new(subject.clone());
        if config.requests_per_minute > 0 {
            status.windows.insert(
                Window::Minute,
                WindowUsage::new(count, config.requests_per_minute),
            );
        }
        status
    }

    fn evict_idle_at(&self, horizon: Duration, now: Duration) {
        let cutoff = now.saturating_sub(horizon);
        let mut log = self.log.lock();
        log.retain(|_, entries| {
            entries.retain(|&stamp| stamp > cutoff);
            !entries.is_empty()
        });
    }
}

impl Default for LocalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterBackend for LocalRateLimiter {
    async fn check(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, crate::store::StoreError> {
        Ok(self.check(subject, config))
    }

    async fn status(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitStatus, crate::store::StoreError> {
        Ok(self.status(subject, config))
    }
}
