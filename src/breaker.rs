//! Circuit breaker for agent routes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Breaker tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before admitting a probe.
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests flow normally.
    Closed,
    /// Requests are short-circuited.
    Open,
    /// One probe request is being allowed through.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Point-in-time view of a breaker, for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Failures recorded since the last success.
    pub failure_count: u32,
}

/// Failure-isolation state machine for one agent route.
///
/// All state sits behind one mutex shared by every concurrent request to the
/// route. There is no background task: the open-to-half-open transition
/// happens lazily, inside whichever [`is_open`](Self::is_open) call first
/// observes that the recovery timeout has elapsed. That call admits the
/// probe request.
///
/// The failure count is deliberately not reset when the probe is admitted.
/// It still sits at the threshold, so a single failed probe re-opens the
/// breaker immediately; only a recorded success closes it and clears the
/// count.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether requests should be short-circuited right now.
    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Report a successful protected call. One success fully closes the
    /// breaker from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.state = BreakerState::Closed;
    }

    /// Report a failed protected call.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Current state without the relaxation side effect.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    fn is_open_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Open {
            return false;
        }

        let recovery = Duration::from_secs(self.config.recovery_timeout_secs);
        let recovered = inner
            .last_failure
            .map_or(true, |at| now.duration_since(at) >= recovery);
        if recovered {
            debug!("Circuit breaker recovery timeout elapsed, admitting a probe");
            inner.state = BreakerState::HalfOpen;
            return false;
        }
        true
    }

    fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);
        if inner.failure_count >= self.config.failure_threshold
            && inner.state != BreakerState::Open
        {
            warn!(failures = inner.failure_count, "Circuit breaker opened");
            inner.state = BreakerState::Open;
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery_timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold,
            recovery_timeout_secs,
        })
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();

        assert!(!breaker.is_open());
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 2);
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(3, 60);
        for _ in 0..3 {
            breaker.record_failure();
        }

        assert!(breaker.is_open());
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
    }

    #[test]
    fn test_one_success_closes_and_clears() {
        let breaker = breaker(3, 60);
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.record_success();

        assert!(!breaker.is_open());
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[test]
    fn test_recovery_timeout_admits_a_probe() {
        let breaker = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }

        // Half a minute in, still open.
        assert!(breaker.is_open_at(t0 + Duration::from_secs(30)));
        // Past the recovery timeout, the same query flips to half-open.
        assert!(!breaker.is_open_at(t0 + Duration::from_secs(61)));
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
    }

    #[test]
    fn test_failed_probe_reopens_immediately() {
        let breaker = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }

        let probe_time = t0 + Duration::from_secs(61);
        assert!(!breaker.is_open_at(probe_time));

        // The count never reset, so one more failure is enough.
        breaker.record_failure_at(probe_time);
        assert!(breaker.is_open_at(probe_time + Duration::from_secs(1)));
    }

    #[test]
    fn test_successful_probe_closes() {
        let breaker = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }

        assert!(!breaker.is_open_at(t0 + Duration::from_secs(61)));
        breaker.record_success();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[test]
    fn test_snapshot_has_no_side_effects() {
        let breaker = breaker(1, 0);
        breaker.record_failure();

        // Snapshot does not perform the open-to-half-open relaxation even
        // though the recovery timeout has already elapsed.
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        assert_eq!(breaker.snapshot().state, BreakerState::Open);

        assert!(!breaker.is_open());
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
    }

    #[test]
    fn test_config_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout_secs, 60);

        let parsed: BreakerConfig = serde_yaml::from_str("failure_threshold: 2").unwrap();
        assert_eq!(parsed.failure_threshold, 2);
        assert_eq!(parsed.recovery_timeout_secs, 60);
    }

    #[test]
    fn test_snapshot_serializes_state_name() {
        let breaker = breaker(1, 60);
        breaker.record_failure();

        let value = serde_json::to_value(breaker.snapshot()).unwrap();
        assert_eq!(value["state"], "open");
        assert_eq!(value["failure_count"], 1);
    }
}
