//! Prompt construction for the extraction request.
//!
//! Pure logic, no I/O. The same document, context and [`ParsingConfig`]
//! always produce the same prompt. The document text goes last, verbatim.

use crate::config::ParsingConfig;

// ---------------------------------------------------------------------------
// Fixed sections
// ---------------------------------------------------------------------------

const ROLE: &str = "You are a senior technical project manager. Read the requirements \
document below and extract the project metadata, an actionable task breakdown with \
dependencies, and supporting documentation.\n\n";

/// JSON shape the model must return. Field names and enums here are what
/// the normalizer expects.
const OUTPUT_SCHEMA: &str = r#"## Output Schema

Return exactly one JSON object with these four top-level keys:

```json
{
  "project_info": {
    "name": "string, at most 255 characters",
    "description": "string, at most 2000 characters",
    "goals": "string",
    "why": "string, the problem this project solves",
    "target_users": "string"
  },
  "tasks": [
    {
      "title": "string, REQUIRED, unique, at most 500 characters",
      "description": "string, REQUIRED, at most 2000 characters",
      "priority": "low | medium | high | urgent",
      "estimated_hours": "integer between 1 and 1000, or omit",
      "tags": ["string, at most 50 characters; at most 10 tags"],
      "depends_on": ["exact title of another task in this list; at most 20"],
      "acceptance_criteria": ["string, at most 200 characters; at most 10 items"]
    }
  ],
  "documentation": [
    {
      "type": "goals | why | target_users | specifications | notes",
      "title": "string, at most 255 characters",
      "content": "string, REQUIRED, at most 10000 characters"
    }
  ],
  "suggested_tags": ["string, at most 50 characters; at most 20 tags"]
}
```
"#;

const TASK_GUIDELINES: &str = r#"## Task Guidelines

1. Each task should be a concrete unit of work one engineer can pick up.
2. Give every task a distinct title. Dependencies refer to tasks by exact title.
3. A task may only depend on tasks that appear in the same `tasks` array.
4. Dependencies must not form a cycle.
5. Use `urgent` and `high` sparingly; most work is `medium`.
"#;

const CRITERIA_CLAUSE: &str =
    "- For each task, list concrete, testable acceptance criteria.\n";
const NO_CRITERIA_CLAUSE: &str =
    "- Leave `acceptance_criteria` as an empty array for every task.\n";
const TAGS_CLAUSE: &str = "- Tag each task by area (e.g. backend, frontend, database) and \
fill `suggested_tags` with tags that apply across the project.\n";
const NO_TAGS_CLAUSE: &str =
    "- Leave `tags` and `suggested_tags` as empty arrays.\n";
const HOURS_CLAUSE: &str =
    "- Estimate `estimated_hours` for each task as a whole number of hours.\n";
const NO_HOURS_CLAUSE: &str = "- Omit `estimated_hours` on every task.\n";

const JSON_ONLY: &str = "Respond with the JSON object only. Do not add prose, explanations, \
or markdown code fences before or after it.\n\n";

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Render the extraction prompt for `document_text`.
///
/// `context` is embedded only when `config.include_context` is set and the
/// context is non-blank.
pub fn build_prompt(document_text: &str, context: Option<&str>, config: &ParsingConfig) -> String {
    let mut prompt = String::with_capacity(OUTPUT_SCHEMA.len() + document_text.len() + 2048);

    prompt.push_str("# Requirements Extraction\n\n");
    prompt.push_str(ROLE);

    prompt.push_str(OUTPUT_SCHEMA);
    prompt.push('\n');
    prompt.push_str(TASK_GUIDELINES);
    prompt.push('\n');

    prompt.push_str("## Extraction Instructions\n\n");
    prompt.push_str(if config.extract_acceptance_criteria {
        CRITERIA_CLAUSE
    } else {
        NO_CRITERIA_CLAUSE
    });
    prompt.push_str(if config.suggest_tags {
        TAGS_CLAUSE
    } else {
        NO_TAGS_CLAUSE
    });
    prompt.push_str(if config.estimate_hours {
        HOURS_CLAUSE
    } else {
        NO_HOURS_CLAUSE
    });
    prompt.push('\n');

    if let Some(ctx) = context
        .map(str::trim)
        .filter(|c| config.include_context && !c.is_empty())
    {
        prompt.push_str("## Project Context\n\n");
        prompt.push_str(
            "Use this background to interpret the document. Do not extract tasks \
             from it directly.\n\n",
        );
        prompt.push_str(ctx);
        prompt.push_str("\n\n");
    }

    prompt.push_str(JSON_ONLY);

    prompt.push_str("## Document\n\n");
    prompt.push_str(document_text);
    prompt
}
