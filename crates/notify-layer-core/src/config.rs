use crate::error::NotifyError;
use crate::transport::AuthMode;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for mutation dispatch.
///
/// The default is a single attempt: a failed start is reported and the user
/// has to trigger it again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Minimum delay between attempts (in milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Maximum delay between attempts (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total number of attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomise delays
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryConfig {
    /// One attempt, fail fast
    pub fn no_retry() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter: false,
        }
    }

    pub fn conservative() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2_000,
            max_attempts: 2,
            jitter: false,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 10_000,
            max_attempts: 5,
            jitter: true,
        }
    }

    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.max_attempts == 0 {
            return Err(NotifyError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        if self.max_attempts > 10 {
            return Err(NotifyError::configuration(
                "max_attempts should not exceed 10",
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(NotifyError::configuration(
                "min_delay_ms cannot be greater than max_delay_ms",
            ));
        }
        if self.max_delay_ms > 60_000 {
            return Err(NotifyError::configuration(
                "max_delay_ms should not exceed 60 seconds",
            ));
        }
        Ok(())
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Retries after the first attempt
    pub fn retries(&self) -> usize {
        self.max_attempts.saturating_sub(1) as usize
    }

    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// What happens to an open subscription when another process is started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPolicy {
    /// Close the previous session before opening the next one
    #[default]
    Exclusive,
    /// Keep every session open until its event arrives or it is closed
    Concurrent,
}

/// Client configuration, the counterpart of the generated `aws-exports` file
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// GraphQL endpoint, e.g. `https://xxx.appsync-api.eu-west-1.amazonaws.com/graphql`
    pub endpoint: String,
    #[builder(default)]
    #[serde(default)]
    pub api_key: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub default_auth_mode: AuthMode,
    #[builder(default = "default_usage_plan_attribute()")]
    #[serde(default = "default_usage_plan_attribute")]
    pub usage_plan_attribute: String,
    #[builder(default = "default_usage_plan_header()")]
    #[serde(default = "default_usage_plan_header")]
    pub usage_plan_header: String,
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub subscribe_on_start: bool,
    #[builder(default)]
    #[serde(default)]
    pub session_policy: SessionPolicy,
    #[builder(default)]
    #[serde(default)]
    pub dispose_on_error: bool,
    #[builder(default = "default_request_timeout_ms()")]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[builder(default)]
    #[serde(default)]
    pub retry_config: RetryConfig,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn from_json(raw: &str) -> Result<Self, NotifyError> {
        let config: ClientConfig = serde_json::from_str(raw)
            .map_err(|e| NotifyError::configuration(format!("Invalid client config: {e}")))?;
        config.check()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn check(&self) -> Result<(), NotifyError> {
        if self.endpoint.trim().is_empty() {
            return Err(NotifyError::configuration("endpoint must not be empty"));
        }
        self.retry_config.validate()
    }
}

impl ClientConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if matches!(&self.endpoint, Some(endpoint) if endpoint.trim().is_empty()) {
            return Err("endpoint must not be empty".to_string());
        }
        if let Some(retry) = &self.retry_config {
            retry.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl From<ClientConfigBuilderError> for NotifyError {
    fn from(value: ClientConfigBuilderError) -> Self {
        NotifyError::configuration(value.to_string())
    }
}

fn default_min_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    1
}
fn default_usage_plan_attribute() -> String {
    "custom:usage_plan".to_string()
}
fn default_usage_plan_header() -> String {
    "x-usage-plan-id".to_string()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
