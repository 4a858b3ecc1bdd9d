use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for the upstream paginated API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to, e.g. `https://secure.mcommons.com/api`.
    pub base_url: String,
    /// Username for HTTP basic auth.
    pub username: String,
    /// Password for HTTP basic auth, redacted in debug output.
    pub password: SecretString,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry policy applied to page count probes.
    #[serde(default)]
    pub probe_retry: RetryConfig,
}

impl ApiConfig {
    /// Large pages of some endpoints take tens of minutes to render server side.
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 3600;

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::invalid(
                "api.base_url",
                "must be an http or https url",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "api.request_timeout_secs",
                "must be greater than 0",
            ));
        }

        self.probe_retry.validate()
    }
}

fn default_request_timeout_secs() -> u64 {
    ApiConfig::DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Exponential backoff policy for requests that must eventually succeed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Factor applied to the delay after every failed attempt. Must be >= 1.0.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay = delay.min(self.max_delay_ms as f64);

        Duration::from_millis(delay as u64)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid(
                "api.probe_retry.max_attempts",
                "must be greater than 0",
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::invalid(
                "api.probe_retry.backoff_multiplier",
                "must be greater than or equal to 1.0",
            ));
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_MULTIPLIER
}
