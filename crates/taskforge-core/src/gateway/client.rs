//! HTTP client for the provider's messages endpoint.
//!
//! [`GatewayClient`] wraps each attempt in a deadline, classifies failures,
//! retries the transient ones with exponential backoff, and keeps
//! per-instance [`ParsingMetrics`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::metrics::{CallOutcome, ParsingMetrics};
use super::retry::{FailureClass, classify_error_type, classify_status};
use super::types::{ErrorEnvelope, LlmExchange, Message, MessagesRequest, MessagesResponse, Usage};
use crate::config::GatewayConfig;

/// Provider API version header value.
const API_VERSION: &str = "2023-06-01";

/// Longest provider message carried into an error.
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Anything that can answer a [`MessagesRequest`].
///
/// [`GatewayClient`] is the production implementation; tests substitute
/// scripted gateways to drive the pipeline without a network.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn send_request(&self, request: &MessagesRequest) -> Result<LlmExchange, GatewayError>;
}

/// Retrying HTTP client with per-instance metrics.
#[derive(Debug)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    metrics: Mutex<ParsingMetrics>,
}

/// A single failed attempt, before the retry loop decides what to do.
#[derive(Debug)]
enum AttemptError {
    Status {
        class: FailureClass,
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    Transport(String),
    TimedOut,
    Malformed(String),
}

/// Outcome of the retry loop for one logical call.
struct RetryRun {
    /// Result of the last attempt.
    result: Result<MessagesResponse, AttemptError>,
    attempts: u32,
    rate_limit_hits: u32,
    /// Duration of the last attempt alone, without earlier attempts or
    /// backoff sleeps.
    provider_time: Duration,
}

impl AttemptError {
    fn class(&self) -> FailureClass {
        match self {
            Self::Status { class, .. } => *class,
            Self::Transport(_) | Self::TimedOut => FailureClass::Network,
            Self::Malformed(_) => FailureClass::MalformedResponse,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn into_gateway_error(self, attempts: u32, timeout: Duration) -> GatewayError {
        match self {
            Self::Status {
                class,
                status,
                message,
                ..
            } => match class {
                FailureClass::Authentication => GatewayError::Authentication { status, message },
                FailureClass::RateLimit => GatewayError::RateLimited { attempts, message },
                FailureClass::Server => GatewayError::Server {
                    status,
                    attempts,
                    message,
                },
                FailureClass::Network => GatewayError::Network { attempts, message },
                FailureClass::InvalidRequest => GatewayError::InvalidRequest { status, message },
                FailureClass::MalformedResponse => GatewayError::MalformedResponse(message),
            },
            Self::Transport(message) => GatewayError::Network { attempts, message },
            Self::TimedOut => GatewayError::Timeout { timeout, attempts },
            Self::Malformed(message) => GatewayError::MalformedResponse(message),
        }
    }
}

impl GatewayClient {
    /// Validate `config` and build the underlying HTTP client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self {
            http,
            config,
            metrics: Mutex::new(ParsingMetrics::default()),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Snapshot of this client's counters.
    pub fn metrics(&self) -> ParsingMetrics {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner()) = ParsingMetrics::default();
    }

    /// Send `messages` with explicit sampling parameters.
    pub async fn send(
        &self,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        messages: Vec<Message>,
    ) -> Result<LlmExchange, GatewayError> {
        let request = MessagesRequest {
            model: model.to_owned(),
            max_tokens,
            temperature,
            messages,
        };
        self.send_request(&request).await
    }

    /// Run the retry loop for one logical call.
    async fn run_with_retry(&self, request: &MessagesRequest) -> RetryRun {
        let policy = self.config.retry;
        let mut attempt = 0u32;
        let mut rate_limit_hits = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, model = %request.model, "sending provider request");

            let attempt_started = Instant::now();
            let result = match tokio::time::timeout(
                self.config.request_timeout,
                self.attempt_once(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AttemptError::TimedOut),
            };
            let provider_time = attempt_started.elapsed();

            let err = match result {
                Ok(response) => {
                    return RetryRun {
                        result: Ok(response),
                        attempts: attempt,
                        rate_limit_hits,
                        provider_time,
                    };
                }
                Err(err) => err,
            };

            let class = err.class();
            if class == FailureClass::RateLimit {
                rate_limit_hits += 1;
            }
            if !class.is_retryable() || !policy.allows_retry_after(attempt) {
                return RetryRun {
                    result: Err(err),
                    attempts: attempt,
                    rate_limit_hits,
                    provider_time,
                };
            }

            let mut delay = policy.backoff_delay(attempt);
            if let Some(hint) = err.retry_after() {
                delay = delay.max(hint).min(policy.max_delay);
            }
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                failure = ?class,
                "provider request failed with retryable error; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt_once(
        &self,
        request: &MessagesRequest,
    ) -> Result<MessagesResponse, AttemptError> {
        let response = self
            .http
            .post(self.config.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body, retry_after));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| AttemptError::Malformed(format!("unexpected response shape: {e}")))?;
        if parsed.text().is_none() {
            return Err(AttemptError::Malformed(
                "response contains no text content".to_owned(),
            ));
        }
        Ok(parsed)
    }

    fn record(&self, outcome: CallOutcome) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(outcome);
    }
}

#[async_trait]
impl LlmGateway for GatewayClient {
    async fn send_request(&self, request: &MessagesRequest) -> Result<LlmExchange, GatewayError> {
        let started = Instant::now();
        let RetryRun {
            result,
            attempts,
            rate_limit_hits,
            provider_time,
        } = self.run_with_retry(request).await;
        let latency = started.elapsed();

        match result {
            Ok(response) => {
                let usage: Usage = response.usage;
                self.record(CallOutcome {
                    usage: Some(usage),
                    provider_time,
                    rate_limit_hits,
                });
                info!(
                    attempts,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    latency_ms = latency.as_millis() as u64,
                    provider_ms = provider_time.as_millis() as u64,
                    "provider request succeeded"
                );
                Ok(LlmExchange {
                    request: request.clone(),
                    text: response.text().unwrap_or_default(),
                    usage,
                    stop_reason: response.stop_reason,
                    attempts,
                    latency,
                })
            }
            Err(err) => {
                self.record(CallOutcome {
                    usage: None,
                    provider_time,
                    rate_limit_hits,
                });
                let err = err.into_gateway_error(attempts, self.config.request_timeout);
                warn!(attempts, error = %err, "provider request failed");
                Err(err)
            }
        }
    }
}

/// Build an [`AttemptError`] from a non-2xx response.
///
/// The typed `error.type` in the body wins; the HTTP status is the fallback.
fn classify_failure(status: u16, body: &str, retry_after: Option<Duration>) -> AttemptError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let class = envelope
        .as_ref()
        .and_then(|e| classify_error_type(&e.error.error_type))
        .unwrap_or_else(|| classify_status(status));
    let message = match envelope {
        Some(e) if !e.error.message.is_empty() => e.error.message,
        _ => body.trim().to_owned(),
    };
    AttemptError::Status {
        class,
        status,
        message: truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS),
        retry_after,
    }
}

/// Parse an integer-seconds `retry-after` header.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
