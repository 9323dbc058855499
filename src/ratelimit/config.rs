//! Rate limit thresholds.

use serde::{Deserialize, Serialize};

use super::window::Window;
use crate::error::{FloodgateError, Result};

/// Thresholds applied to one agent route.
///
/// A threshold of zero disables enforcement for that window entirely: the
/// window is neither counted nor consulted. `burst_limit` is carried through
/// configuration for forward compatibility but is not enforced by any
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Maximum requests per hour.
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    /// Maximum requests per day.
    #[serde(default = "default_requests_per_day")]
    pub requests_per_day: u32,
    /// Reserved burst allowance above the steady-state rate.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,
    /// Sliding window length for the in-process backend, in seconds.
    #[serde(default = "default_window_size_secs")]
    pub window_size_secs: u64,
    /// Master switch; a disabled config admits everything.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_requests_per_hour() -> u32 {
    1000
}

fn default_requests_per_day() -> u32 {
    10000
}

fn default_burst_limit() -> u32 {
    10
}

fn default_window_size_secs() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            requests_per_day: default_requests_per_day(),
            burst_limit: default_burst_limit(),
            window_size_secs: default_window_size_secs(),
            enabled: default_enabled(),
        }
    }
}

impl RateLimitConfig {
    /// A config that admits everything without counting.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Threshold for a window. Zero means unlimited.
    pub fn limit_for(&self, window: Window) -> u32 {
        match window {
            Window::Minute => self.requests_per_minute,
            Window::Hour => self.requests_per_hour,
            Window::Day => self.requests_per_day,
        }
    }

    /// Windows with a positive threshold, in consultation order.
    pub fn consulted_windows(&self) -> impl Iterator<Item = (Window, u32)> + '_ {
        Window::ALL.into_iter().filter_map(move |window| {
            let limit = self.limit_for(window);
            (limit > 0).then_some((window, limit))
        })
    }

    /// Whether every window is unlimited.
    pub fn is_unlimited(&self) -> bool {
        self.consulted_windows().next().is_none()
    }

    /// Reject shapes the types cannot rule out.
    pub fn validate(&self) -> Result<()> {
        self.check_shape()
            .map_err(|msg| FloodgateError::Config(msg.to_string()))
    }

    pub(crate) fn check_shape(&self) -> std::result::Result<(), &'static str> {
        if self.window_size_secs == 0 {
            return Err("window_size_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.requests_per_hour, 1000);
        assert_eq!(config.requests_per_day, 10000);
        assert_eq!(config.burst_limit, 10);
        assert_eq!(config.window_size_secs, 60);
        assert!(config.enabled);
    }

    #[test]
    fn test_limit_for_window() {
        let config = RateLimitConfig {
            requests_per_minute: 5,
            requests_per_hour: 50,
            requests_per_day: 500,
            ..RateLimitConfig::default()
        };
        assert_eq!(config.limit_for(Window::Minute), 5);
        assert_eq!(config.limit_for(Window::Hour), 50);
        assert_eq!(config.limit_for(Window::Day), 500);
    }

    #[test]
    fn test_zero_threshold_window_is_not_consulted() {
        let config = RateLimitConfig {
            requests_per_minute: 0,
            requests_per_hour: 100,
            requests_per_day: 0,
            ..RateLimitConfig::default()
        };
        let consulted: Vec<_> = config.consulted_windows().collect();
        assert_eq!(consulted, vec![(Window::Hour, 100)]);
        assert!(!config.is_unlimited());
    }

    #[test]
    fn test_all_zero_thresholds_mean_unlimited() {
        let config = RateLimitConfig {
            requests_per_minute: 0,
            requests_per_hour: 0,
            requests_per_day: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.is_unlimited());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: RateLimitConfig = serde_yaml::from_str("requests_per_minute: 3").unwrap();
        assert_eq!(config.requests_per_minute, 3);
        assert_eq!(config.requests_per_hour, 1000);
        assert!(config.enabled);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = RateLimitConfig {
            window_size_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RateLimitConfig::default().validate().is_ok());
    }
}
