//! Check results and usage introspection types.

use serde::Serialize;
use std::collections::BTreeMap;

use super::subject::SubjectKey;
use super::window::Window;

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Remaining quota, the minimum across all consulted windows.
    pub remaining: u32,
    /// Epoch seconds at which the binding window rolls over.
    pub reset_time: u64,
    /// Seconds to wait before retrying. Only present on denial.
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// An admitted result.
    pub fn allowed(remaining: u32, reset_time: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time,
            retry_after: None,
        }
    }

    /// A denied result. Remaining quota is zero by definition.
    pub fn denied(reset_time: u64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time,
            retry_after: Some(retry_after),
        }
    }
}

/// Usage within one window, as reported by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    /// Requests counted in the current window.
    pub count: u64,
    /// The window's threshold.
    pub limit: u32,
    /// Requests left before the threshold is reached.
    pub remaining: u32,
}

impl WindowUsage {
    /// Usage from a raw count and threshold.
    pub fn new(count: u64, limit: u32) -> Self {
        let used = u32::try_from(count).unwrap_or(u32::MAX);
        Self {
            count,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Point-in-time usage for one subject across its consulted windows.
///
/// Produced by status queries, which never consume quota: asking for status
/// twice in a row reports the same counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Whom the usage belongs to.
    pub subject: SubjectKey,
    /// Usage per consulted window. Windows with a zero threshold are absent.
    pub windows: BTreeMap<Window, WindowUsage>,
}

impl RateLimitStatus {
    /// An empty status for a subject.
    pub fn new(subject: SubjectKey) -> Self {
        Self {
            subject,
            windows: BTreeMap::new(),
        }
    }

    /// Usage for one window, if it is consulted.
    pub fn window(&self, window: Window) -> Option<&WindowUsage> {
        self.windows.get(&window)
    }

    /// Minimum remaining quota across consulted windows.
    ///
    /// `None` when no window is consulted, which means the subject is
    /// effectively unlimited.
    pub fn remaining(&self) -> Option<u32> {
        self.windows.values().map(|usage| usage.remaining).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_result_has_no_retry_hint() {
        let result = RateLimitResult::allowed(5, 1_704_067_260);
        assert!(result.allowed);
        assert_eq!(result.remaining, 5);
        assert_eq!(result.retry_after, None);
    }

    #[test]
    fn test_denied_result_zeroes_remaining() {
        let result = RateLimitResult::denied(1_704_067_260, 58);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.retry_after, Some(58));
    }

    #[test]
    fn test_window_usage_saturates_remaining() {
        let usage = WindowUsage::new(7, 5);
        assert_eq!(usage.remaining, 0);

        let usage = WindowUsage::new(2, 5);
        assert_eq!(usage.remaining, 3);
    }

    #[test]
    fn test_status_remaining_is_minimum_across_windows() {
        let mut status = RateLimitStatus::new(SubjectKey::user("u1"));
        status.windows.insert(Window::Minute, WindowUsage::new(3, 60));
        status.windows.insert(Window::Hour, WindowUsage::new(998, 1000));

        assert_eq!(status.remaining(), Some(2));
        assert_eq!(status.window(Window::Day), None);
    }

    #[test]
    fn test_empty_status_reports_unlimited() {
        let status = RateLimitStatus::new(SubjectKey::agent("research"));
        assert_eq!(status.remaining(), None);
    }

    #[test]
    fn test_status_serializes_windows_by_name() {
        let mut status = RateLimitStatus::new(SubjectKey::user("u1"));
        status.windows.insert(Window::Minute, WindowUsage::new(1, 60));

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["windows"]["minute"]["count"], 1);
        assert_eq!(value["windows"]["minute"]["remaining"], 59);
        assert_eq!(value["subject"]["value"], "u1");
    }
}
