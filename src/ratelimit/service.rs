//! Rate limiter facade: backend selection, fallback, and fail-open behavior.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::config::{BackendMode, FloodgateConfig};
use crate::error::{FloodgateError, Result};
use crate::store::{CounterStore, StoreError};

use super::config::RateLimitConfig;
use super::distributed::DistributedRateLimiter;
use super::local::LocalRateLimiter;
use super::result::{RateLimitResult, RateLimitStatus};
use super::subject::{SubjectKey, SubjectType};
use super::window::unix_now;

/// Default budget for one counter store operation.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

enum Primary {
    Local,
    Distributed(DistributedRateLimiter),
}

/// The rate limiting entry point the rest of the system talks to.
///
/// Wraps one primary backend and makes its failures invisible to admission:
/// [`check_rate_limit`](Self::check_rate_limit) is infallible. When the
/// distributed backend's store misbehaves, the check either retries against
/// in-process counters or fails open, depending on the fallback policy. A
/// broken store must degrade accuracy, never availability.
pub struct RateLimiterService {
    primary: Primary,
    /// In-process counters. Also the fallback target in distributed mode.
    local: LocalRateLimiter,
    fallback_to_local: bool,
    store_timeout: Duration,
}

impl RateLimiterService {
    /// A service that counts in process memory only.
    pub fn local() -> Self {
        Self {
            primary: Primary::Local,
            local: LocalRateLimiter::new(),
            fallback_to_local: false,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// A service that counts in a shared store.
    ///
    /// With `fallback_to_local` set, a failed store operation is retried
    /// against in-process counters; otherwise failed checks are admitted
    /// without counting.
    pub fn distributed(store: Arc<dyn CounterStore>, fallback_to_local: bool) -> Self {
        Self {
            primary: Primary::Distributed(DistributedRateLimiter::new(store)),
            local: LocalRateLimiter::new(),
            fallback_to_local,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Build a service from configuration. Distributed mode needs a store.
    pub fn from_config(
        config: &FloodgateConfig,
        store: Option<Arc<dyn CounterStore>>,
    ) -> Result<Self> {
        let service = match config.backend {
            BackendMode::Local => Self::local(),
            BackendMode::Distributed => {
                let store = store.ok_or_else(|| {
                    FloodgateError::Config(
                        "distributed backend requires a counter store".to_string(),
                    )
                })?;
                Self::distributed(store, config.fallback_to_local)
            }
        };
        Ok(service.with_store_timeout(config.store_timeout()))
    }

    /// Override the per-operation store budget.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Check and consume one unit of quota for a subject.
    ///
    /// Never fails: disabled or degenerate configs admit everything, and in
    /// distributed mode a store failure falls back or fails open.
    pub async fn check_rate_limit(
        &self,
        subject_type: SubjectType,
        subject_value: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        let now = unix_now();
        if !enforceable(config) {
            return open_result(config, now);
        }

        let subject = SubjectKey::new(subject_type, subject_value);
        match &self.primary {
            Primary::Local => self.local.check(&subject, config),
            Primary::Distributed(remote) => {
                match self.bounded(remote.check(&subject, config)).await {
                    Ok(result) => result,
                    Err(err) if self.fallback_to_local => {
                        warn!(
                            subject = %subject,
                            error = %err,
                            "Counter store check failed, falling back to local counters"
                        );
                        self.local.check(&subject, config)
                    }
                    Err(err) => {
                        warn!(subject = %subject, error = %err, "Counter store check failed, failing open");
                        open_result(config, now)
                    }
                }
            }
        }
    }

    /// Report current usage for a subject without consuming quota.
    ///
    /// Unlike checks, status queries surface store failures to the caller
    /// when fallback is disabled; a dashboard can afford an error where the
    /// request path cannot.
    pub async fn get_rate_limit_status(
        &self,
        subject_type: SubjectType,
        subject_value: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitStatus> {
        let subject = SubjectKey::new(subject_type, subject_value);
        match &self.primary {
            Primary::Local => Ok(self.local.status(&subject, config)),
            Primary::Distributed(remote) => {
                match self.bounded(remote.status(&subject, config)).await {
                    Ok(status) => Ok(status),
                    Err(err) if self.fallback_to_local => {
                        warn!(
                            subject = %subject,
                            error = %err,
                            "Counter store status failed, falling back to local counters"
                        );
                        Ok(self.local.status(&subject, config))
                    }
                    Err(err) => Err(FloodgateError::Store(err)),
                }
            }
        }
    }

    /// Reclaim memory held by idle local counters.
    pub fn evict_idle(&self, horizon: Duration) {
        self.local.evict_idle(horizon);
    }

    async fn bounded<T, F>(&self, operation: F) -> std::result::Result<T, StoreError>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match timeout(self.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        }
    }
}

fn enforceable(config: &RateLimitConfig) -> bool {
    if !config.enabled {
        trace!("Rate limiting disabled, admitting without counting");
        return false;
    }
    // A zero-length window cannot hold any request; treat it as disabled
    // rather than denying everything.
    config.window_size_secs > 0
}

fn open_result(config: &RateLimitConfig, now: Duration) -> RateLimitResult {
    RateLimitResult::allowed(
        config.requests_per_minute,
        (now + Duration::from_secs(config.window_size_secs)).as_secs(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BucketKey, MemoryCounterStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to an in-process store until `fail_from` calls have been
    /// made, then fails every later call.
    struct FlakyStore {
        inner: MemoryCounterStore,
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl FlakyStore {
        fn failing_from(fail_from: usize) -> Self {
            Self {
                inner: MemoryCounterStore::new(),
                calls: AtomicUsize::new(0),
                fail_from,
            }
        }

        fn tick(&self) -> std::result::Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_from {
                Err(StoreError::Unavailable("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CounterStore for FlakyStore {
        async fn incr(&self, buckets: &[BucketKey]) -> std::result::Result<Vec<u64>, StoreError> {
            self.tick()?;
            self.inner.incr(buckets).await
        }

        async fn get(&self, buckets: &[BucketKey]) -> std::result::Result<Vec<u64>, StoreError> {
            self.tick()?;
            self.inner.get(buckets).await
        }
    }

    /// Never completes any operation.
    struct StalledStore;

    #[async_trait]
    impl CounterStore for StalledStore {
        async fn incr(&self, _buckets: &[BucketKey]) -> std::result::Result<Vec<u64>, StoreError> {
            std::future::pending().await
        }

        async fn get(&self, _buckets: &[BucketKey]) -> std::result::Result<Vec<u64>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_disabled_config_always_admits() {
        let service = RateLimiterService::local();
        let config = RateLimitConfig {
            requests_per_minute: 1,
            enabled: false,
            ..RateLimitConfig::default()
        };

        for _ in 0..100 {
            let result = service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await;
            assert!(result.allowed);
            assert_eq!(result.remaining, 1);
        }
    }

    #[tokio::test]
    async fn test_zero_length_window_admits_everything() {
        let service = RateLimiterService::local();
        let config = RateLimitConfig {
            requests_per_minute: 1,
            window_size_secs: 0,
            ..RateLimitConfig::default()
        };

        for _ in 0..10 {
            assert!(
                service
                    .check_rate_limit(SubjectType::User, "u1", &config)
                    .await
                    .allowed
            );
        }
    }

    #[tokio::test]
    async fn test_local_mode_enforces_limits() {
        let service = RateLimiterService::local();
        let config = RateLimitConfig {
            requests_per_minute: 2,
            ..RateLimitConfig::default()
        };

        assert!(
            service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
        assert!(
            service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
        assert!(
            !service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_local_counters() {
        // First store call succeeds, the second fails mid-flight.
        let store = Arc::new(FlakyStore::failing_from(2));
        let service = RateLimiterService::distributed(store, true);
        let config = RateLimitConfig::default();

        let first = service
            .check_rate_limit(SubjectType::User, "u1", &config)
            .await;
        assert!(first.allowed);

        // The second check still returns a valid result, computed from the
        // local counters: one recorded request, so remaining is limit - 1.
        let second = service
            .check_rate_limit(SubjectType::User, "u1", &config)
            .await;
        assert!(second.allowed);
        assert_eq!(second.remaining, config.requests_per_minute - 1);
    }

    #[tokio::test]
    async fn test_fallback_counters_keep_enforcing() {
        let store = Arc::new(FlakyStore::failing_from(1));
        let service = RateLimiterService::distributed(store, true);
        let config = RateLimitConfig {
            requests_per_minute: 2,
            ..RateLimitConfig::default()
        };

        assert!(
            service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
        assert!(
            service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
        assert!(
            !service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn test_store_failure_without_fallback_fails_open() {
        let store = Arc::new(FlakyStore::failing_from(1));
        let service = RateLimiterService::distributed(store, false);
        let config = RateLimitConfig {
            requests_per_minute: 1,
            ..RateLimitConfig::default()
        };

        // Nothing is counted, so even repeated checks are admitted.
        for _ in 0..5 {
            let result = service
                .check_rate_limit(SubjectType::User, "u1", &config)
                .await;
            assert!(result.allowed);
            assert_eq!(result.remaining, 1);
        }
    }

    #[tokio::test]
    async fn test_stalled_store_is_bounded_by_the_timeout() {
        let service = RateLimiterService::distributed(Arc::new(StalledStore), true)
            .with_store_timeout(Duration::from_millis(10));
        let config = RateLimitConfig::default();

        let result = service
            .check_rate_limit(SubjectType::User, "u1", &config)
            .await;
        assert!(result.allowed);
        assert_eq!(result.remaining, config.requests_per_minute - 1);
    }

    #[tokio::test]
    async fn test_status_error_surfaces_without_fallback() {
        let store = Arc::new(FlakyStore::failing_from(1));
        let service = RateLimiterService::distributed(store, false);
        let config = RateLimitConfig::default();

        let err = service
            .get_rate_limit_status(SubjectType::User, "u1", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FloodgateError::Store(_)));
    }

    #[tokio::test]
    async fn test_status_falls_back_when_permitted() {
        let store = Arc::new(FlakyStore::failing_from(1));
        let service = RateLimiterService::distributed(store, true);
        let config = RateLimitConfig::default();

        let status = service
            .get_rate_limit_status(SubjectType::User, "u1", &config)
            .await
            .unwrap();
        assert_eq!(status.subject, SubjectKey::user("u1"));
    }

    #[tokio::test]
    async fn test_evict_idle_reclaims_local_state() {
        let service = RateLimiterService::local();
        let config = RateLimitConfig::default();

        service
            .check_rate_limit(SubjectType::User, "u1", &config)
            .await;
        service
            .check_rate_limit(SubjectType::Ip, "10.0.0.7", &config)
            .await;
        assert_eq!(service.local.subject_count(), 2);

        service.evict_idle(Duration::ZERO);
        assert_eq!(service.local.subject_count(), 0);
    }

    #[tokio::test]
    async fn test_from_config_requires_a_store_for_distributed_mode() {
        let config = FloodgateConfig {
            backend: BackendMode::Distributed,
            ..FloodgateConfig::default()
        };
        assert!(RateLimiterService::from_config(&config, None).is_err());

        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        assert!(RateLimiterService::from_config(&config, Some(store)).is_ok());
    }
}
