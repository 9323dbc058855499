//! Backend abstraction over the local and distributed rate limiters.

use async_trait::async_trait;

use super::config::RateLimitConfig;
use super::result::{RateLimitResult, RateLimitStatus};
use super::subject::SubjectKey;
use crate::store::StoreError;

/// A counter backend the limiter service can drive.
///
/// Implementations differ in precision and failure modes but uphold the same
/// safety property: a subject at or over a window's threshold is denied until
/// the window rolls over, and a subject under every threshold is admitted.
/// The `remaining` and `retry_after` fields may differ between backends.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check and consume one unit of quota for a subject.
    async fn check(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, StoreError>;

    /// Report current usage without consuming quota.
    async fn status(
        &self,
        subject: &SubjectKey,
        config: &RateLimitConfig,
    ) -> Result<RateLimitStatus, StoreError>;
}
