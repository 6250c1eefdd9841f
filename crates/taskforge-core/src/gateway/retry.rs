//! Retry policy and failure classification.
//!
//! Every failed attempt is sorted into a [`FailureClass`]. Only rate-limit,
//! server, and network failures are retried; the delay before attempt
//! `n + 1` is `min(base_delay * 2^(n - 1), max_delay)`.

use std::time::Duration;

/// Category of a failed provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad or missing credentials. Terminal.
    Authentication,
    RateLimit,
    /// 5xx or overloaded.
    Server,
    /// Connection failure, dropped body, or attempt deadline exceeded.
    Network,
    /// The provider refused this request as written. Terminal.
    InvalidRequest,
    /// The provider answered 2xx with a body that breaks its contract. Terminal.
    MalformedResponse,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Server | Self::Network)
    }
}

/// Classify by HTTP status alone. Used when the body carries no typed error.
pub fn classify_status(status: u16) -> FailureClass {
    match status {
        401 | 403 => FailureClass::Authentication,
        429 => FailureClass::RateLimit,
        408 => FailureClass::Network,
        500..=599 => FailureClass::Server,
        _ => FailureClass::InvalidRequest,
    }
}

/// Classify by the provider's `error.type` string, if it is a known one.
pub fn classify_error_type(error_type: &str) -> Option<FailureClass> {
    match error_type {
        "authentication_error" | "permission_error" => Some(FailureClass::Authentication),
        "rate_limit_error" => Some(FailureClass::RateLimit),
        "api_error" | "overloaded_error" => Some(FailureClass::Server),
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            Some(FailureClass::InvalidRequest)
        }
        _ => None,
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total network attempts per logical call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits. Useful in tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
