//! Typed failures of a compile run.
//!
//! [`CompileError`]'s `Display` is the technical message meant for logs.
//! [`CompileError::user_message`] is what a caller may show to an end
//! user: it never includes credentials, request bodies, provider messages
//! or raw model output.

use thiserror::Error;

use crate::extract::ParseError;
use crate::gateway::GatewayError;
use crate::graph::GraphCycleError;
use crate::store::PersistenceError;

/// Input rejected before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document is too short: {len} characters (minimum {min})")]
    DocumentTooShort { len: usize, min: usize },

    #[error("document is too long: {len} characters (maximum {max})")]
    DocumentTooLong { len: usize, max: usize },

    #[error("project context is too long: {len} characters (maximum {max})")]
    ContextTooLong { len: usize, max: usize },
}

/// Any failure of [`Compiler::parse`](crate::pipeline::Compiler::parse) or
/// of committing its output.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("could not parse model output: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    GraphCycle(#[from] GraphCycleError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CompileError {
    /// Stable snake_case category for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Gateway(e) => match e {
                GatewayError::Authentication { .. } => "authentication",
                GatewayError::RateLimited { .. } => "rate_limit",
                GatewayError::Server { .. } => "server",
                GatewayError::Network { .. } => "network",
                GatewayError::Timeout { .. } => "timeout",
                GatewayError::InvalidRequest { .. } => "invalid_request",
                GatewayError::MalformedResponse(_) => "malformed_response",
                GatewayError::Config(_) | GatewayError::Client(_) => "configuration",
            },
            Self::Parse(_) => "parse",
            Self::GraphCycle(_) => "graph_cycle",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Whether resubmitting the same request later might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Gateway(e) => match e {
                GatewayError::Authentication { .. } => {
                    "The AI provider rejected the configured API key. Check your credentials."
                        .to_owned()
                }
                GatewayError::RateLimited { attempts, .. } => format!(
                    "The AI provider is rate limiting requests (gave up after {attempts} attempts). Try again later."
                ),
                GatewayError::Server { .. } => {
                    "The AI provider is temporarily unavailable. Try again later.".to_owned()
                }
                GatewayError::Network { .. } => {
                    "Could not reach the AI provider. Check your network connection.".to_owned()
                }
                GatewayError::Timeout { .. } => {
                    "The AI provider took too long to respond. Try again or shorten the document."
                        .to_owned()
                }
                GatewayError::InvalidRequest { .. } => {
                    "The AI provider rejected the request. The document may be too large."
                        .to_owned()
                }
                GatewayError::MalformedResponse(_) => {
                    "The AI provider returned an unexpected response.".to_owned()
                }
                GatewayError::Config(_) | GatewayError::Client(_) => {
                    "The AI provider client is misconfigured.".to_owned()
                }
            },
            Self::Parse(_) => {
                "The document could not be turned into a task list. Try rephrasing it or adding more detail."
                    .to_owned()
            }
            Self::GraphCycle(e) => format!(
                "The extracted tasks contain a circular dependency between {:?} and {:?}.",
                e.from_title, e.to_title
            ),
            Self::Persistence(_) => "The results could not be saved.".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn auth_failure_hides_provider_message() {
        let err = CompileError::from(GatewayError::Authentication {
            status: 401,
            message: "invalid x-api-key sk-secret-123".to_owned(),
        });
        assert_eq!(err.kind(), "authentication");
        assert!(!err.is_retryable());
        assert!(!err.user_message().contains("sk-secret"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn exhausted_rate_limit_is_retryable_with_attempts() {
        let err = CompileError::from(GatewayError::RateLimited {
            attempts: 3,
            message: "slow down".to_owned(),
        });
        assert_eq!(err.kind(), "rate_limit");
        assert!(err.is_retryable());
        assert!(err.user_message().contains("3 attempts"));
    }

    #[test]
    fn parse_error_hides_raw_output() {
        let err = CompileError::from(ParseError::NoJsonObject {
            excerpt: "I cannot help with that".to_owned(),
        });
        assert_eq!(err.kind(), "parse");
        assert!(!err.is_retryable());
        assert!(!err.user_message().contains("cannot help"));
        assert!(err.to_string().contains("cannot help"));
    }

    #[test]
    fn cycle_message_names_both_tasks() {
        let err = CompileError::from(GraphCycleError {
            from: NodeId(1),
            from_title: "B".to_owned(),
            to: NodeId(0),
            to_title: "A".to_owned(),
        });
        assert_eq!(err.kind(), "graph_cycle");
        let msg = err.user_message();
        assert!(msg.contains("\"A\"") && msg.contains("\"B\""));
    }

    #[test]
    fn validation_message_is_shown_as_is() {
        let err = CompileError::from(ValidationError::DocumentTooShort { len: 3, min: 10 });
        assert_eq!(err.kind(), "validation");
        assert!(err.user_message().contains("minimum 10"));
    }
}
