//! Service configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::policyset::EngineConfig;
use crate::source::{open_source, FeedSource};

/// Default feed location, relative to the working directory.
pub const DEFAULT_FEED: &str = "data/exit-policies";

/// One reload per hour, matching the upstream feed cadence.
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 3600;

/// ServiceConfig describes a long-running exit-list service.
///
/// ```yaml
/// feed: https://example.org/exit-policies.gz
/// reload_interval_secs: 3600
/// engine:
///   strategy: index
///   max_age: 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// File path or http(s) URL of the policy feed
    pub feed: String,
    /// Seconds between reload triggers
    pub reload_interval_secs: u64,
    /// Timeout for HTTP feed downloads
    pub http_timeout_secs: u64,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            feed: DEFAULT_FEED.to_string(),
            reload_interval_secs: DEFAULT_RELOAD_INTERVAL_SECS,
            http_timeout_secs: 60,
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.feed.trim().is_empty() {
            return Err(Error::Config("feed location is empty".to_string()));
        }
        if self.reload_interval_secs == 0 {
            return Err(Error::Config(
                "reload_interval_secs must be positive".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Config(
                "http_timeout_secs must be positive".to_string(),
            ));
        }
        if self.engine.canonical_target().ip().is_none() {
            return Err(Error::Config(format!(
                "canonical address {:?} is not an IP address",
                self.engine.canonical_address
            )));
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    /// Open the configured feed.
    pub fn open_source(&self) -> Box<dyn FeedSource> {
        open_source(&self.feed, Duration::from_secs(self.http_timeout_secs))
    }
}
