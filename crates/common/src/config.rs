//! Client configuration
//!
//! Every knob has a default so a config file or environment only needs to
//! name what it overrides. Durations are expressed in milliseconds when
//! serialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientResult, ConfigError};
use crate::http::client::resolve_url;
use crate::utils::serde::duration_millis;

/// Configuration for [`AuthenticatedClient`](crate::http::AuthenticatedClient)
/// and its session machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto
    pub base_url: String,

    /// Path (or absolute URL) of the token refresh endpoint
    pub refresh_path: String,

    /// Per-attempt timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Retries after the first attempt for transient failures
    pub retry_attempts: u32,

    /// Linear backoff unit: the n-th retry waits `retry_base_delay * n`
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,

    /// Whether GET responses are cached by default
    pub enable_cache: bool,

    /// Default cache lifetime for GET responses
    #[serde(with = "duration_millis")]
    pub cache_ttl: Duration,

    /// Whether concurrent identical GETs share one network call
    pub dedupe_requests: bool,

    /// Retries after the first attempt for the refresh call itself
    pub refresh_attempts: u32,

    /// Linear backoff unit for refresh retries
    #[serde(with = "duration_millis")]
    pub refresh_base_delay: Duration,

    /// Refresh proactively once less than this remains before expiry
    #[serde(with = "duration_millis")]
    pub proactive_window: Duration,

    /// Interval between expiry monitor ticks
    #[serde(with = "duration_millis")]
    pub monitor_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            enable_cache: true,
            cache_ttl: Duration::from_secs(5 * 60),
            dedupe_requests: true,
            refresh_attempts: 2,
            refresh_base_delay: Duration::from_millis(500),
            proactive_window: Duration::from_secs(5 * 60),
            monitor_interval: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Defaults with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// Reject configurations the client cannot run with.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for an empty base URL, an empty
    /// refresh path, a zero timeout, or a zero monitor interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.refresh_path.trim().is_empty() {
            return Err(ConfigError::Invalid("refresh_path must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::Invalid("monitor_interval must be greater than zero".into()));
        }
        Ok(())
    }

    /// Absolute URL of the refresh endpoint.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`](crate::ClientError::Config) if the joined URL
    /// does not parse.
    pub fn refresh_url(&self) -> ClientResult<String> {
        resolve_url(&self.base_url, &self.refresh_path, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.proactive_window, Duration::from_secs(300));
        assert!(config.enable_cache);
        assert!(config.dedupe_requests);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://api.example.com","timeout":5000}"#)
                .expect("parse config");

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_path, "/auth/refresh");
    }

    #[test]
    fn validate_rejects_empty_base_url() {
        let config = ClientConfig::new("  ");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_monitor_interval() {
        let config = ClientConfig { monitor_interval: Duration::ZERO, ..ClientConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn refresh_url_joins_base_or_passes_absolute() {
        let config = ClientConfig::new("https://api.example.com/v2/");
        assert_eq!(config.refresh_url().expect("url"), "https://api.example.com/v2/auth/refresh");

        let config = ClientConfig {
            refresh_path: "https://auth.example.com/token".into(),
            ..ClientConfig::new("https://api.example.com")
        };
        assert_eq!(config.refresh_url().expect("url"), "https://auth.example.com/token");
    }
}
