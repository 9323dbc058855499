//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::error::{FloodgateError, Result};
use crate::ratelimit::RateLimitConfig;

/// Which counter backend the limiter service drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Count in process memory.
    Local,
    /// Count in a shared store.
    Distributed,
}

impl Default for BackendMode {
    fn default() -> Self {
        BackendMode::Local
    }
}

/// Main configuration for the admission-control subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Counter backend selection
    #[serde(default)]
    pub backend: BackendMode,

    /// Retry failed distributed operations against local counters
    #[serde(default = "default_fallback_to_local")]
    pub fallback_to_local: bool,

    /// Budget for one counter store operation, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Breaker settings applied to every route
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Limits applied to routes without an override
    #[serde(default)]
    pub default_limits: RateLimitConfig,

    /// Per-route limit overrides, keyed by route id
    #[serde(default)]
    pub routes: HashMap<String, RateLimitConfig>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            backend: BackendMode::default(),
            fallback_to_local: default_fallback_to_local(),
            store_timeout_ms: default_store_timeout_ms(),
            breaker: BreakerConfig::default(),
            default_limits: RateLimitConfig::default(),
            routes: HashMap::new(),
        }
    }
}

fn default_fallback_to_local() -> bool {
    true
}

fn default_store_timeout_ms() -> u64 {
    500
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limit shapes the types cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if let Err(msg) = self.default_limits.check_shape() {
            return Err(FloodgateError::Config(format!("default_limits: {}", msg)));
        }
        for (route, limits) in &self.routes {
            if let Err(msg) = limits.check_shape() {
                return Err(FloodgateError::Config(format!("route {}: {}", route, msg)));
            }
        }
        Ok(())
    }

    /// Limits for a route, falling back to the defaults.
    pub fn limits_for(&self, route: &str) -> &RateLimitConfig {
        self.routes.get(route).unwrap_or(&self.default_limits)
    }

    /// The store budget as a duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
