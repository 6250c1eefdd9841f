//! Configuration for the gateway client and the parsing pipeline.
//!
//! [`GatewayConfig`] describes how to reach the LLM provider and how hard to
//! retry; [`ParsingConfig`] toggles which optional fields the prompt asks the
//! model to populate. Neither type touches the filesystem; the CLI layers a
//! config file on top.

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use crate::gateway::retry::RetryPolicy;

/// Errors raised when a configuration value is out of range.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("API key not found; set TASKFORGE_API_KEY or ANTHROPIC_API_KEY")]
    MissingApiKey,

    #[error("temperature must be between 0 and 1, got {0}")]
    InvalidTemperature(f32),

    #[error("max_tokens must be at least 1")]
    InvalidMaxTokens,

    #[error("max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("max_delay ({max:?}) must not be shorter than base_delay ({base:?})")]
    InvalidDelays { base: Duration, max: Duration },
}

/// Connection and sampling settings for the LLM provider.
#[derive(Clone, PartialEq)]
pub struct GatewayConfig {
    /// Provider root URL, without the `/v1/messages` path.
    pub base_url: String,
    /// Secret sent in the `x-api-key` header. Never logged.
    pub api_key: String,
    /// Model identifier sent verbatim in the request body.
    pub model: String,
    pub max_tokens: u32,
    /// Sampling temperature. Kept low so repeated parses agree.
    pub temperature: f32,
    /// Wall-clock deadline for a single attempt.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl GatewayConfig {
    pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
    pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;
    pub const DEFAULT_TEMPERATURE: f32 = 0.1;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

    /// Build a config with defaults for everything except the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_owned(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            request_timeout: Self::DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a config from the environment.
    ///
    /// API key: `TASKFORGE_API_KEY`, then `ANTHROPIC_API_KEY`.
    /// Optional overrides: `TASKFORGE_BASE_URL`, `TASKFORGE_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("TASKFORGE_API_KEY")
            .or_else(|_| env::var("ANTHROPIC_API_KEY"))
            .map_err(|_| ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Ok(url) = env::var("TASKFORGE_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = env::var("TASKFORGE_MODEL") {
            config.model = model;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts);
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(ConfigError::InvalidDelays {
                base: self.retry.base_delay,
                max: self.retry.max_delay,
            });
        }
        Ok(())
    }

    /// Full URL of the messages endpoint.
    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Instruction toggles for the prompt builder.
///
/// Each flag adds or omits one instruction clause. None of them changes the
/// JSON schema the model is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsingConfig {
    /// Embed the caller-supplied project context ahead of the document.
    pub include_context: bool,
    pub extract_acceptance_criteria: bool,
    pub suggest_tags: bool,
    pub estimate_hours: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            include_context: true,
            extract_acceptance_criteria: true,
            suggest_tags: true,
            estimate_hours: true,
        }
    }
}
