//! End-to-end compile: document text in, canonical result and task graph out.
//!
//! A run either returns a complete [`ParseOutput`] or a [`CompileError`];
//! there is no partial result.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{GatewayConfig, ParsingConfig};
use crate::error::{CompileError, ValidationError};
use crate::extract::extract_json_object;
use crate::gateway::{GatewayClient, LlmGateway, Message, MessagesRequest, Usage};
use crate::graph::{TaskGraph, resolve};
use crate::normalize::{ParsedResult, normalize};
use crate::prompt::build_prompt;

pub const MIN_DOCUMENT_CHARS: usize = 10;
pub const MAX_DOCUMENT_CHARS: usize = 100_000;
pub const MAX_CONTEXT_CHARS: usize = 5_000;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A validated, immutable parse request.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingRequest {
    document_id: String,
    document_text: String,
    context: Option<String>,
    config: ParsingConfig,
}

impl ParsingRequest {
    /// Check bounds and assign a document id.
    ///
    /// Lengths are counted in characters after trimming. Blank context is
    /// treated as absent.
    pub fn new(
        document_text: impl Into<String>,
        context: Option<String>,
        config: ParsingConfig,
    ) -> Result<Self, ValidationError> {
        let document_text = document_text.into();
        let len = document_text.trim().chars().count();
        if len < MIN_DOCUMENT_CHARS {
            return Err(ValidationError::DocumentTooShort {
                len,
                min: MIN_DOCUMENT_CHARS,
            });
        }
        if len > MAX_DOCUMENT_CHARS {
            return Err(ValidationError::DocumentTooLong {
                len,
                max: MAX_DOCUMENT_CHARS,
            });
        }

        let context = context.filter(|c| !c.trim().is_empty());
        if let Some(ctx) = &context {
            let len = ctx.trim().chars().count();
            if len > MAX_CONTEXT_CHARS {
                return Err(ValidationError::ContextTooLong {
                    len,
                    max: MAX_CONTEXT_CHARS,
                });
            }
        }

        Ok(Self {
            document_id: document_id(&document_text, chrono::Utc::now().timestamp()),
            document_text,
            context,
            config,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }
}

/// `doc_<unix-seconds>_<16 hex chars of sha256(text)>`.
fn document_id(text: &str, unix_secs: i64) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("doc_{unix_secs}_{}", &hex::encode(digest)[..16])
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything a successful run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutput {
    pub document_id: String,
    pub result: ParsedResult,
    pub graph: TaskGraph,
    pub usage: Usage,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Drives prompt, gateway, extraction, normalization and resolution.
#[derive(Clone)]
pub struct Compiler {
    gateway: Arc<dyn LlmGateway>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    /// Use `gateway` with the default model and sampling settings.
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            model: GatewayConfig::DEFAULT_MODEL.to_owned(),
            max_tokens: GatewayConfig::DEFAULT_MAX_TOKENS,
            temperature: GatewayConfig::DEFAULT_TEMPERATURE,
        }
    }

    /// Use `client`, taking model and sampling settings from its config.
    pub fn for_client(client: Arc<GatewayClient>) -> Self {
        let config = client.config();
        let (model, max_tokens, temperature) =
            (config.model.clone(), config.max_tokens, config.temperature);
        Self {
            gateway: client,
            model,
            max_tokens,
            temperature,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Validate the inputs and run the full pipeline.
    pub async fn parse(
        &self,
        document_text: &str,
        context: Option<&str>,
        config: Option<ParsingConfig>,
    ) -> Result<ParseOutput, CompileError> {
        let request = ParsingRequest::new(
            document_text,
            context.map(str::to_owned),
            config.unwrap_or_default(),
        )?;
        self.run(&request).await
    }

    /// Run the pipeline for an already validated request.
    pub async fn run(&self, request: &ParsingRequest) -> Result<ParseOutput, CompileError> {
        let document_id = request.document_id();
        let result = self.run_stages(request).await;
        match &result {
            Ok(output) => info!(
                document_id,
                tasks = output.graph.len(),
                edges = output.graph.edges().len(),
                attempts = output.attempts,
                "document compiled"
            ),
            Err(err) => warn!(
                document_id,
                kind = err.kind(),
                error = %err,
                "document compile failed"
            ),
        }
        result
    }

    async fn run_stages(&self, request: &ParsingRequest) -> Result<ParseOutput, CompileError> {
        let document_id = request.document_id();
        let prompt = build_prompt(request.document_text(), request.context(), request.config());
        debug!(document_id, prompt_chars = prompt.len(), model = %self.model, "prompt built");

        let exchange = self
            .gateway
            .send_request(&MessagesRequest {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                messages: vec![Message::user(prompt)],
            })
            .await?;
        debug!(
            document_id,
            response_chars = exchange.text.len(),
            stop_reason = exchange.stop_reason.as_deref().unwrap_or("unknown"),
            "model responded"
        );

        let raw = extract_json_object(&exchange.text)?;
        let result = normalize(&raw)?;
        debug!(
            document_id,
            tasks = result.tasks.len(),
            documentation = result.documentation.len(),
            "model output normalized"
        );

        let graph = resolve(&result.tasks)?;

        Ok(ParseOutput {
            document_id: document_id.to_owned(),
            result,
            graph,
            usage: exchange.usage,
            attempts: exchange.attempts,
        })
    }
}
