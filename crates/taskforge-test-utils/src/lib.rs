//! Shared test utilities for taskforge integration tests.
//!
//! Provides a mock LLM provider on a local port (via `wiremock`) that
//! speaks the messages-endpoint wire format, canned success and error
//! bodies, and sample requirement documents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use taskforge_core::{GatewayConfig, RetryPolicy};

/// API key the mock provider expects.
pub const TEST_API_KEY: &str = "test-key";

/// Model name used in test configs.
pub const TEST_MODEL: &str = "test-model";

/// A small but complete requirements document.
pub const SAMPLE_PRD: &str = "\
# Bookshelf

## Goals
Let readers track the books they own and want to read.

## Why
Spreadsheets are a poor fit for personal libraries; people lose track of loans.

## Target users
Casual readers and book clubs.

## Features
- Store books in a database.
- Expose a REST API for books.
- Build a web UI on top of the API.
";

/// A well-formed extraction for [`SAMPLE_PRD`]: three tasks in a chain.
pub fn sample_extraction() -> Value {
    json!({
        "project_info": {
            "name": "Bookshelf",
            "description": "Personal library tracker",
            "goals": "Track owned and wanted books",
            "why": "Spreadsheets are a poor fit",
            "target_users": "Casual readers and book clubs"
        },
        "tasks": [
            {
                "title": "Setup DB",
                "description": "Create the books schema",
                "priority": "high",
                "estimated_hours": 4,
                "tags": ["database"],
                "depends_on": [],
                "acceptance_criteria": ["Migrations run cleanly"]
            },
            {
                "title": "Create API",
                "description": "CRUD endpoints for books",
                "priority": "medium",
                "estimated_hours": 8,
                "tags": ["backend"],
                "depends_on": ["Setup DB"],
                "acceptance_criteria": ["All endpoints return JSON"]
            },
            {
                "title": "Build UI",
                "description": "Web front end over the API",
                "priority": "low",
                "estimated_hours": 12,
                "tags": ["frontend"],
                "depends_on": ["Create API"],
                "acceptance_criteria": []
            }
        ],
        "documentation": [
            {"type": "goals", "title": "Goals", "content": "Track owned and wanted books"}
        ],
        "suggested_tags": ["books", "web"]
    })
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// A successful messages response whose single text block is `text`.
pub fn success_body(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 120, "output_tokens": 80}
    })
}

/// A provider error body: `{type: "error", error: {type, message}}`.
pub fn error_body(error_type: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {"type": error_type, "message": message}
    })
}

pub fn success(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(success_body(text))
}

pub fn rate_limited() -> ResponseTemplate {
    ResponseTemplate::new(429).set_body_json(error_body("rate_limit_error", "Rate limited"))
}

pub fn overloaded() -> ResponseTemplate {
    ResponseTemplate::new(529).set_body_json(error_body("overloaded_error", "Overloaded"))
}

pub fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401)
        .set_body_json(error_body("authentication_error", "invalid x-api-key"))
}

pub fn invalid_request() -> ResponseTemplate {
    ResponseTemplate::new(400)
        .set_body_json(error_body("invalid_request_error", "prompt is too long"))
}

/// A 200 whose body lacks the required `content`/`usage` fields.
pub fn malformed() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"unexpected": true}))
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

/// Replays a fixed list of responses, one per request. The last one
/// repeats once the list is exhausted.
struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        let last = self.responses.len().saturating_sub(1);
        self.responses[i.min(last)].clone()
    }
}

/// A local HTTP server standing in for the provider.
pub struct MockProvider {
    server: MockServer,
}

impl MockProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Answer `POST /v1/messages` with `responses` in order.
    ///
    /// Only requests carrying [`TEST_API_KEY`] match; anything else gets
    /// wiremock's default 404.
    pub async fn respond_with_sequence(&self, responses: Vec<ResponseTemplate>) {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", TEST_API_KEY))
            .respond_with(Sequence {
                responses,
                next: AtomicUsize::new(0),
            })
            .mount(&self.server)
            .await;
    }

    /// Always answer with a successful body carrying `text`.
    pub async fn respond_with_text(&self, text: &str) {
        self.respond_with_sequence(vec![success(text)]).await;
    }

    /// Every request the server has received, in order.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    pub async fn request_count(&self) -> usize {
        self.requests().await.len()
    }

    /// Gateway config aimed at this server, with millisecond backoff so
    /// retry tests run fast.
    pub fn config(&self) -> GatewayConfig {
        GatewayConfig::new(TEST_API_KEY)
            .with_base_url(self.uri())
            .with_model(TEST_MODEL)
            .with_request_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(3))
    }
}

/// Retry policy with `max_attempts` and 1-10 ms backoff.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
}
