//! Full pipeline against a mock provider: prompt out, canonical result and
//! graph back, optional commit into the in-memory store.

use std::sync::Arc;

use serde_json::{Value, json};

use taskforge_core::normalize::Priority;
use taskforge_core::{
    CompileError, Compiler, GatewayClient, MemoryStore, ParsingConfig, commit_output,
    validate_shape,
};
use taskforge_test_utils::{
    MockProvider, SAMPLE_PRD, TEST_MODEL, fast_retry, rate_limited, sample_extraction, success,
    unauthorized,
};

async fn compiler_answering(text: &str) -> (MockProvider, Compiler) {
    let provider = MockProvider::start().await;
    provider.respond_with_text(text).await;
    let client = Arc::new(GatewayClient::new(provider.config()).unwrap());
    (provider, Compiler::for_client(client))
}

#[tokio::test]
async fn sample_document_compiles_to_a_chain() {
    let (provider, compiler) = compiler_answering(&sample_extraction().to_string()).await;

    let output = compiler.parse(SAMPLE_PRD, None, None).await.unwrap();

    assert_eq!(output.result.project_info.name, "Bookshelf");
    assert_eq!(output.result.tasks.len(), 3);
    assert_eq!(output.result.tasks[0].priority, Priority::High);
    assert_eq!(output.graph.len(), 3);
    assert_eq!(output.graph.edges().len(), 2);
    assert_eq!(output.attempts, 1);

    let order: Vec<&str> = output
        .graph
        .topological_order()
        .into_iter()
        .filter_map(|id| output.graph.node(id))
        .map(|n| n.task.title.as_str())
        .collect();
    assert_eq!(order, vec!["Setup DB", "Create API", "Build UI"]);

    let body: Value = serde_json::from_slice(&provider.requests().await[0].body).unwrap();
    assert_eq!(body["model"], TEST_MODEL);
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.ends_with(SAMPLE_PRD));
}

#[tokio::test]
async fn fenced_answer_with_prose_is_accepted() {
    let wrapped = format!(
        "Here is the breakdown:\n\n```json\n{}\n```\nHope this helps!",
        serde_json::to_string_pretty(&sample_extraction()).unwrap()
    );
    let (_provider, compiler) = compiler_answering(&wrapped).await;

    let output = compiler.parse(SAMPLE_PRD, None, None).await.unwrap();
    assert_eq!(output.result.tasks.len(), 3);
}

#[tokio::test]
async fn quirky_answer_is_normalized() {
    let answer = json!({
        "project_info": {"name": "  Quirky   App "},
        "tasks": [
            {"title": "Setup DB", "description": "schema", "priority": "critical", "estimated_hours": -5},
            {"title": "Create API", "description": "rest", "depends_on": ["Setup DB", "Nonexistent Title"]},
            {"title": "", "description": "dropped"}
        ]
    });
    let (_provider, compiler) = compiler_answering(&answer.to_string()).await;

    let output = compiler.parse(SAMPLE_PRD, None, None).await.unwrap();

    assert_eq!(output.result.project_info.name, "Quirky App");
    assert_eq!(output.result.tasks.len(), 2);
    assert_eq!(output.result.tasks[0].priority, Priority::Medium);
    assert_eq!(output.result.tasks[0].estimated_hours, None);
    assert_eq!(output.graph.edges().len(), 1);
    assert!(output.result.documentation.is_empty());
}

#[tokio::test]
async fn cyclic_answer_is_rejected() {
    let answer = json!({
        "tasks": [
            {"title": "A", "description": "a", "depends_on": ["B"]},
            {"title": "B", "description": "b", "depends_on": ["A"]}
        ]
    });
    let (_provider, compiler) = compiler_answering(&answer.to_string()).await;

    let err = compiler.parse(SAMPLE_PRD, None, None).await.unwrap_err();
    assert!(matches!(err, CompileError::GraphCycle(_)), "got: {err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn refusal_is_a_parse_error() {
    let (_provider, compiler) = compiler_answering("I can't help with that request.").await;

    let err = compiler.parse(SAMPLE_PRD, None, None).await.unwrap_err();
    assert_eq!(err.kind(), "parse");
    assert!(!err.user_message().contains("can't help"));
}

#[tokio::test]
async fn short_document_never_reaches_the_provider() {
    let (provider, compiler) = compiler_answering("{}").await;

    let err = compiler.parse("too short", None, None).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(provider.request_count().await, 0);
}

#[tokio::test]
async fn auth_failure_surfaces_without_secret() {
    let provider = MockProvider::start().await;
    provider.respond_with_sequence(vec![unauthorized()]).await;
    let compiler = Compiler::for_client(Arc::new(GatewayClient::new(provider.config()).unwrap()));

    let err = compiler.parse(SAMPLE_PRD, None, None).await.unwrap_err();
    assert_eq!(err.kind(), "authentication");
    assert!(!err.user_message().contains("x-api-key"));
}

#[tokio::test]
async fn transient_failures_are_retried_inside_parse() {
    let provider = MockProvider::start().await;
    provider
        .respond_with_sequence(vec![
            rate_limited(),
            success(&sample_extraction().to_string()),
        ])
        .await;
    let client = Arc::new(GatewayClient::new(provider.config().with_retry(fast_retry(3))).unwrap());
    let compiler = Compiler::for_client(client.clone());

    let output = compiler.parse(SAMPLE_PRD, None, None).await.unwrap();
    assert_eq!(output.attempts, 2);
    assert_eq!(client.metrics().rate_limit_hits, 1);
}

#[tokio::test]
async fn context_and_toggles_shape_the_prompt() {
    let (provider, compiler) = compiler_answering(&sample_extraction().to_string()).await;
    let config = ParsingConfig {
        estimate_hours: false,
        ..ParsingConfig::default()
    };

    compiler
        .parse(SAMPLE_PRD, Some("Internal tool for a library"), Some(config))
        .await
        .unwrap();

    let body: Value = serde_json::from_slice(&provider.requests().await[0].body).unwrap();
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("Internal tool for a library"));
    assert!(prompt.contains("Omit `estimated_hours`"));
}

#[tokio::test]
async fn compiled_output_commits_into_store() {
    let (_provider, compiler) = compiler_answering(&sample_extraction().to_string()).await;
    let output = compiler.parse(SAMPLE_PRD, None, None).await.unwrap();

    let store = MemoryStore::new();
    let summary = commit_output(&store, &output).await.unwrap();

    let state = store.snapshot();
    assert_eq!(state.projects[0].id, summary.project_id);
    assert_eq!(state.tasks.len(), 3);
    assert_eq!(state.dependencies.len(), 2);
    assert_eq!(state.tags.len(), 3);
    assert_eq!(state.audit.len(), 1);
}

#[test]
fn sample_document_passes_shape_check() {
    let report = validate_shape(SAMPLE_PRD);
    assert!(report.is_valid);
    assert_eq!(report.completeness_score, 1.0);
}
