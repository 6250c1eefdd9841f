//! CLI handlers for the document commands.
//!
//! Implements:
//! - `taskforge validate <file>` -- offline shape check
//! - `taskforge prompt <file>`   -- print the rendered extraction prompt
//! - `taskforge parse <file>`    -- run the full pipeline, optionally commit

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, error};

use taskforge_core::pipeline::ParseOutput;
use taskforge_core::store::CommitSummary;
use taskforge_core::{
    Compiler, GatewayClient, MemoryStore, ParsingConfig, build_prompt, commit_output,
    validate_shape,
};

use crate::DocumentArgs;
use crate::config::TaskforgeConfig;

/// Read `path`, or stdin when `path` is `-`.
fn read_document(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read document from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read document: {path}"))
}

impl DocumentArgs {
    fn parsing_config(&self) -> ParsingConfig {
        ParsingConfig {
            include_context: !self.no_context,
            extract_acceptance_criteria: !self.no_criteria,
            suggest_tags: !self.no_tags,
            estimate_hours: !self.no_hours,
        }
    }
}

// -----------------------------------------------------------------------
// taskforge validate <file>
// -----------------------------------------------------------------------

pub fn cmd_validate(file: &str) -> Result<()> {
    let text = read_document(file)?;
    let report = validate_shape(&text);

    println!("Completeness: {:.0}%", report.completeness_score * 100.0);
    if report.issues.is_empty() {
        println!("No issues found.");
    } else {
        println!("Issues:");
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }

    if !report.is_valid {
        bail!("document {file} is not ready for parsing");
    }
    println!("Document looks parseable.");
    Ok(())
}

// -----------------------------------------------------------------------
// taskforge prompt <file>
// -----------------------------------------------------------------------

pub fn cmd_prompt(args: &DocumentArgs) -> Result<()> {
    let text = read_document(&args.file)?;
    let prompt = build_prompt(&text, args.context.as_deref(), &args.parsing_config());
    println!("{prompt}");
    Ok(())
}

// -----------------------------------------------------------------------
// taskforge parse <file>
// -----------------------------------------------------------------------

pub async fn cmd_parse(
    args: &DocumentArgs,
    cli_model: Option<&str>,
    json: bool,
    commit: bool,
) -> Result<()> {
    let text = read_document(&args.file)?;
    let resolved = TaskforgeConfig::resolve(cli_model)?;
    debug!(config = ?resolved.gateway, "resolved provider configuration");

    let client = Arc::new(
        GatewayClient::new(resolved.gateway).context("failed to create provider client")?,
    );
    let compiler = Compiler::for_client(Arc::clone(&client));

    let result = compiler
        .parse(&text, args.context.as_deref(), Some(args.parsing_config()))
        .await;
    debug!(metrics = ?client.metrics(), "gateway metrics");

    let output = match result {
        Ok(output) => output,
        Err(err) => {
            error!(kind = err.kind(), retryable = err.is_retryable(), error = %err, "parse failed");
            bail!("{}", err.user_message());
        }
    };

    let summary = if commit {
        let store = MemoryStore::new();
        Some(
            commit_output(&store, &output)
                .await
                .context("failed to commit parse output")?,
        )
    } else {
        None
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&output).context("failed to serialize output")?;
        println!("{rendered}");
    } else {
        print_summary(&output);
    }
    if let Some(summary) = summary {
        print_commit(&summary);
    }
    Ok(())
}

fn print_summary(output: &ParseOutput) {
    let info = &output.result.project_info;
    let name = if info.name.is_empty() {
        "(unnamed)"
    } else {
        info.name.as_str()
    };

    println!("Project:  {name}");
    println!("Document: {}", output.document_id);
    if !info.description.is_empty() {
        println!("  {}", info.description);
    }
    println!();

    println!("Tasks ({}):", output.graph.len());
    for id in output.graph.topological_order() {
        let Some(node) = output.graph.node(id) else {
            continue;
        };
        let task = &node.task;
        let hours = task
            .estimated_hours
            .map(|h| format!(", {h}h"))
            .unwrap_or_default();
        println!("  {id} {} [{}{hours}]", task.title, task.priority);

        let deps: Vec<&str> = output
            .graph
            .dependencies_of(id)
            .into_iter()
            .filter_map(|d| output.graph.node(d))
            .map(|d| d.task.title.as_str())
            .collect();
        if !deps.is_empty() {
            println!("      depends on: {}", deps.join(", "));
        }
        if !task.tags.is_empty() {
            println!("      tags: {}", task.tags.join(", "));
        }
    }
    println!();
    println!("Dependency edges:    {}", output.graph.edges().len());
    println!("Documentation items: {}", output.result.documentation.len());
    if !output.result.suggested_tags.is_empty() {
        println!(
            "Suggested tags:      {}",
            output.result.suggested_tags.join(", ")
        );
    }
    println!(
        "Tokens:              {} in / {} out ({} attempt{})",
        output.usage.input_tokens,
        output.usage.output_tokens,
        output.attempts,
        if output.attempts == 1 { "" } else { "s" }
    );
}

fn print_commit(summary: &CommitSummary) {
    println!();
    println!("Committed to in-memory store.");
    println!("  Project ID:       {}", summary.project_id);
    println!("  Tasks:            {}", summary.task_ids.len());
    println!("  Dependency edges: {}", summary.dependencies_created);
    println!("  Tag links:        {}", summary.tags_linked);
}
