//! Request gating for agent routes.

use std::sync::Arc;
use tracing::debug;

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::ratelimit::{RateLimitConfig, RateLimitResult, RateLimiterService, SubjectType};

/// Outcome of gating one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Every check passed. Carries the user-subject result so callers can
    /// emit quota headers.
    Granted {
        /// The user subject's check result.
        result: RateLimitResult,
    },
    /// A rate limit denied the request.
    Denied {
        /// Which subject class hit its limit.
        subject_type: SubjectType,
        /// The denying check's result, with retry guidance.
        result: RateLimitResult,
    },
    /// The route's breaker is open. No quota was consumed.
    CircuitOpen,
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

/// Admission control for a single agent route.
///
/// Owns the route's limits and breaker; the limiter service is shared across
/// routes and injected at construction. Checks run in a fixed order (user,
/// then client address, then the route itself) and the first denial wins:
/// later subjects are not consulted and keep their quota. Quota consumed by
/// checks that passed before the denial is not refunded.
pub struct AdmissionGate {
    route: String,
    limits: RateLimitConfig,
    breaker: CircuitBreaker,
    limiter: Arc<RateLimiterService>,
}

impl AdmissionGate {
    /// Create a gate for a route.
    pub fn new(
        route: impl Into<String>,
        limits: RateLimitConfig,
        breaker: BreakerConfig,
        limiter: Arc<RateLimiterService>,
    ) -> Self {
        Self {
            route: route.into(),
            limits,
            breaker: CircuitBreaker::new(breaker),
            limiter,
        }
    }

    /// The route this gate protects.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// The limits applied to this route.
    pub fn limits(&self) -> &RateLimitConfig {
        &self.limits
    }

    /// Decide whether one request may proceed.
    pub async fn admit(&self, user_id: &str, client_ip: &str) -> Admission {
        if self.breaker.is_open() {
            debug!(route = %self.route, "Request short-circuited by open breaker");
            return Admission::CircuitOpen;
        }

        let user = self
            .limiter
            .check_rate_limit(SubjectType::User, user_id, &self.limits)
            .await;
        if !user.allowed {
            debug!(route = %self.route, subject = %SubjectType::User, "Request denied by rate limit");
            return Admission::Denied {
                subject_type: SubjectType::User,
                result: user,
            };
        }

        for (subject_type, value) in [
            (SubjectType::Ip, client_ip),
            (SubjectType::Agent, self.route.as_str()),
        ] {
            let result = self
                .limiter
                .check_rate_limit(subject_type, value, &self.limits)
                .await;
            if !result.allowed {
                debug!(route = %self.route, subject = %subject_type, "Request denied by rate limit");
                return Admission::Denied {
                    subject_type,
                    result,
                };
            }
        }

        Admission::Granted { result: user }
    }

    /// Report that the protected call completed successfully.
    pub fn report_success(&self) {
        self.breaker.record_success();
    }

    /// Report that the protected call failed.
    ///
    /// Called for downstream failures regardless of which checks passed.
    /// Consumed quota stays consumed; the failure feeds the breaker only.
    pub fn report_failure(&self) {
        self.breaker.record_failure();
    }

    /// The route's breaker state, for status surfaces.
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }
}
