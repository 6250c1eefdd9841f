//! Terminal errors surfaced by the gateway client.

use std::time::Duration;

use thiserror::Error;

use super::retry::FailureClass;
use crate::config::ConfigError;

/// A gateway call that ended without a usable response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("rate limited after {attempts} attempt(s): {message}")]
    RateLimited { attempts: u32, message: String },

    #[error("provider error (HTTP {status}) after {attempts} attempt(s): {message}")]
    Server {
        status: u16,
        attempts: u32,
        message: String,
    },

    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    #[error("request exceeded {timeout:?} deadline after {attempts} attempt(s)")]
    Timeout { timeout: Duration, attempts: u32 },

    #[error("provider rejected the request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("invalid gateway configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl GatewayError {
    /// Failure class of the last attempt, if the error came from one.
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Self::Authentication { .. } => Some(FailureClass::Authentication),
            Self::RateLimited { .. } => Some(FailureClass::RateLimit),
            Self::Server { .. } => Some(FailureClass::Server),
            Self::Network { .. } | Self::Timeout { .. } => Some(FailureClass::Network),
            Self::InvalidRequest { .. } => Some(FailureClass::InvalidRequest),
            Self::MalformedResponse(_) => Some(FailureClass::MalformedResponse),
            Self::Config(_) | Self::Client(_) => None,
        }
    }

    /// Whether the failure class is transient. A retryable error returned
    /// from `send` means the attempt budget was exhausted.
    pub fn is_retryable(&self) -> bool {
        self.class().is_some_and(FailureClass::is_retryable)
    }

    /// Number of attempts made, where the variant records it.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RateLimited { attempts, .. }
            | Self::Server { attempts, .. }
            | Self::Network { attempts, .. }
            | Self::Timeout { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
