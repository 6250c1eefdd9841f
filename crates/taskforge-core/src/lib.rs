//! Requirements-to-task-graph compiler.
//!
//! Turns a free-form requirements document into normalized project
//! metadata plus an acyclic task dependency graph by asking an LLM provider
//! for a structured extraction and reconciling its answer against a strict
//! schema.
//!
//! ```text
//! document text
//!     |  prompt::build_prompt
//!     v
//! GatewayClient::send  (timeout + classified retry)
//!     |  raw text
//!     v
//! extract::extract_json_object
//!     |  serde_json::Value
//!     v
//! normalize::normalize
//!     |  ParsedResult
//!     v
//! graph::resolve
//!     |  TaskGraph
//!     v
//! store::commit_output  (optional hand-off to persistence)
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod shape;
pub mod store;

pub use config::{GatewayConfig, ParsingConfig, RetryPolicy};
pub use error::{CompileError, ValidationError};
pub use extract::{ParseError, extract_json_object};
pub use gateway::{GatewayClient, GatewayError, LlmGateway, ParsingMetrics};
pub use graph::{GraphCycleError, TaskGraph, resolve};
pub use normalize::{ParsedResult, normalize};
pub use pipeline::{Compiler, ParseOutput, ParsingRequest};
pub use prompt::build_prompt;
pub use shape::{ShapeReport, validate_shape};
pub use store::{GraphStore, MemoryStore, PersistenceError, commit_output};
