//! Gateway to the external LLM provider.
//!
//! ```text
//! Compiler
//!     |
//!     v
//! LlmGateway::send_request(&MessagesRequest)
//!     |
//!     +-- attempt 1 --timeout--> POST /v1/messages
//!     |      failure -> FailureClass
//!     |      transient? sleep(min(base * 2^(n-1), max)) and go again
//!     +-- attempt n ...
//!     |
//!     v
//! LlmExchange { text, usage, attempts, latency }   (metrics updated once)
//! ```

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;

pub use client::{GatewayClient, LlmGateway};
pub use error::GatewayError;
pub use metrics::ParsingMetrics;
pub use retry::{FailureClass, RetryPolicy};
pub use types::{LlmExchange, Message, MessagesRequest, Role, Usage};
