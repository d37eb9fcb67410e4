//! Browser session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Desktop Chrome user agent presented to the portals.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable. Discovered when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, workers open pages on that browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Timeout for the listing data response, in seconds.
    #[serde(default = "default_data_timeout")]
    pub data_timeout: u64,

    /// Interval between UI condition checks, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_path: None,
            remote_url: None,
            chrome_args: Vec::new(),
            user_agent: default_user_agent(),
            navigation_timeout: default_navigation_timeout(),
            data_timeout: default_data_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl BrowserEngineConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

pub fn default_headless() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

pub fn default_navigation_timeout() -> u64 {
    60
}

pub fn default_data_timeout() -> u64 {
    30
}

pub fn default_poll_interval() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: BrowserEngineConfig = toml::from_str("headless = false\ndata_timeout = 5").unwrap();
        assert!(!config.headless);
        assert_eq!(config.data_timeout(), Duration::from_secs(5));
        assert_eq!(config.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
