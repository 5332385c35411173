#![forbid(unsafe_code)]

//! Declarative refresh configuration.
//!
//! ```json
//! {
//!   "base_proxy_path": "/proxy",
//!   "fetch_timeout_ms": 30000,
//!   "poll_interval_ms": 15000,
//!   "strategies": [
//!     { "dependency": "compute/vms", "policy": "interval", "interval_ms": 5000 },
//!     { "dependency": "/proxy/billing", "policy": "stale_after", "interval_ms": 600000 }
//!   ]
//! }
//! ```
//!
//! TOML files with the same shape load when the `policy-config` feature is
//! enabled. Relative dependency paths are joined onto `base_proxy_path`.

use std::fs;
use std::path::{Path, PathBuf};

use nimbus_core::Duration;
use nimbus_model::Endpoint;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`SyncConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    /// Only produced with the `policy-config` feature.
    #[error("invalid TOML config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Which [`UpdateStrategy`](crate::UpdateStrategy) a dependency is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPolicy {
    Never,
    Interval,
    StaleAfter,
}

/// One strategy binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Resource URL, or a path relative to `base_proxy_path`.
    pub dependency: String,
    pub policy: StrategyPolicy,
    /// Falls back to `poll_interval_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub base_proxy_path: String,
    pub fetch_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub strategies: Vec<StrategyConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_proxy_path: "/proxy".to_owned(),
            fetch_timeout_ms: 30_000,
            poll_interval_ms: 15_000,
            strategies: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|err| ConfigError::Toml(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or a `.toml` file with `policy-config`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let read = || {
            fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        match extension.as_str() {
            "json" => Self::from_json_str(&read()?),
            #[cfg(feature = "policy-config")]
            "toml" => Self::from_toml_str(&read()?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Reject zero timeouts, zero intervals, and empty dependencies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        for (i, strategy) in self.strategies.iter().enumerate() {
            if strategy.dependency.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "strategies[{i}].dependency is empty"
                )));
            }
            if strategy.interval_ms == Some(0) && strategy.policy != StrategyPolicy::Never {
                return Err(ConfigError::Invalid(format!(
                    "strategies[{i}].interval_ms must be positive"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Interval for `strategy`, falling back to the global poll interval.
    #[must_use]
    pub fn interval_for(&self, strategy: &StrategyConfig) -> Duration {
        Duration::from_millis(strategy.interval_ms.unwrap_or(self.poll_interval_ms))
    }

    /// An endpoint rooted at `base_proxy_path`.
    #[must_use]
    pub fn endpoint(&self, resource: &str) -> Endpoint {
        Endpoint::new(self.base_proxy_path.as_str()).segment(resource)
    }

    /// Resolve a configured dependency to the URL its resource is keyed by.
    #[must_use]
    pub fn dependency_url(&self, dependency: &str) -> String {
        if dependency.contains("://") || dependency.starts_with('/') {
            dependency.to_owned()
        } else {
            self.endpoint(dependency).url(None)
        }
    }
}
