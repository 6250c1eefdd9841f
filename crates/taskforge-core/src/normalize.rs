//! Canonical extraction types and the normalizer that produces them.
//!
//! [`normalize`] turns whatever JSON object the model returned into a
//! [`ParsedResult`] that always satisfies the schema: strings are trimmed,
//! whitespace-collapsed and length-capped, enums fall back to their
//! defaults, out-of-range numbers become absent, and lists are filtered and
//! capped. Only tasks without a title or description are dropped; every
//! other problem is coerced. Feeding a serialized `ParsedResult` back in
//! yields the same value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::extract::ParseError;

/// Field and list bounds of the canonical schema.
pub mod limits {
    pub const TASK_TITLE: usize = 500;
    pub const TASK_DESCRIPTION: usize = 2000;
    pub const TAG: usize = 50;
    pub const TAGS_PER_TASK: usize = 10;
    pub const DEPENDENCIES_PER_TASK: usize = 20;
    pub const ACCEPTANCE_CRITERION: usize = 200;
    pub const ACCEPTANCE_CRITERIA_PER_TASK: usize = 10;
    pub const DOC_TITLE: usize = 255;
    pub const DOC_CONTENT: usize = 10_000;
    pub const SUGGESTED_TAGS: usize = 20;
    pub const PROJECT_NAME: usize = 255;
    pub const PROJECT_DESCRIPTION: usize = 2000;
    pub const PROJECT_PROSE: usize = 10_000;
    pub const MIN_HOURS: u32 = 1;
    pub const MAX_HOURS: u32 = 1000;
}

/// Top-level keys the model is asked to return.
pub const REQUIRED_SECTIONS: [&str; 4] =
    ["project_info", "tasks", "documentation", "suggested_tags"];

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(EnumParseError {
                kind: "priority",
                value: other.to_owned(),
            }),
        }
    }
}

/// Kind of a documentation item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentationType {
    Goals,
    Why,
    TargetUsers,
    Specifications,
    #[default]
    Notes,
}

impl DocumentationType {
    pub const ALL: [DocumentationType; 5] = [
        Self::Goals,
        Self::Why,
        Self::TargetUsers,
        Self::Specifications,
        Self::Notes,
    ];
}

impl fmt::Display for DocumentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Goals => "goals",
            Self::Why => "why",
            Self::TargetUsers => "target_users",
            Self::Specifications => "specifications",
            Self::Notes => "notes",
        };
        f.write_str(s)
    }
}

impl FromStr for DocumentationType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goals" => Ok(Self::Goals),
            "why" => Ok(Self::Why),
            "target_users" => Ok(Self::TargetUsers),
            "specifications" => Ok(Self::Specifications),
            "notes" => Ok(Self::Notes),
            other => Err(EnumParseError {
                kind: "documentation type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Error returned when parsing an unknown enum literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ---------------------------------------------------------------------------
// Canonical entities
// ---------------------------------------------------------------------------

/// Project-level metadata. Every field defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProjectInfo {
    pub name: String,
    pub description: String,
    pub goals: String,
    pub why: String,
    pub target_users: String,
}

/// A single task as extracted from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// `None` means unknown effort, which is distinct from zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u32>,
    pub tags: Vec<String>,
    /// Titles of tasks that must finish before this one.
    #[serde(rename = "depends_on")]
    pub dependency_titles: Vec<String>,
    pub acceptance_criteria: Vec<String>,
}

/// A documentation item: goals, rationale, audience, specs, or notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocumentationItem {
    #[serde(rename = "type")]
    pub doc_type: DocumentationType,
    pub title: String,
    pub content: String,
}

/// The canonical, schema-conformant extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub project_info: ExtractedProjectInfo,
    pub tasks: Vec<ExtractedTask>,
    pub documentation: Vec<ExtractedDocumentationItem>,
    pub suggested_tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a raw model object into a [`ParsedResult`].
///
/// Fails only when none of [`REQUIRED_SECTIONS`] is present.
pub fn normalize(raw: &Map<String, Value>) -> Result<ParsedResult, ParseError> {
    let present = |key: &str| raw.get(key).is_some_and(|v| !v.is_null());
    if !REQUIRED_SECTIONS.iter().any(|key| present(key)) {
        return Err(ParseError::MissingSections);
    }
    for key in REQUIRED_SECTIONS.iter().filter(|key| !present(key)) {
        debug!(section = key, "model output missing section; using default");
    }

    let project_info = raw
        .get("project_info")
        .and_then(Value::as_object)
        .map(normalize_project_info)
        .unwrap_or_default();

    let raw_tasks = raw.get("tasks").and_then(Value::as_array);
    let tasks: Vec<ExtractedTask> = raw_tasks
        .into_iter()
        .flatten()
        .filter_map(normalize_task)
        .collect();
    let dropped = raw_tasks.map_or(0, Vec::len) - tasks.len();
    if dropped > 0 {
        warn!(dropped, "dropped tasks without a title or description");
    }

    let documentation = raw
        .get("documentation")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .map(normalize_documentation)
        .collect();

    let suggested_tags = string_list(
        raw.get("suggested_tags"),
        limits::SUGGESTED_TAGS,
        limits::TAG,
    );

    Ok(ParsedResult {
        project_info,
        tasks,
        documentation,
        suggested_tags,
    })
}

fn normalize_project_info(obj: &Map<String, Value>) -> ExtractedProjectInfo {
    ExtractedProjectInfo {
        name: prose_field(obj.get("name"), limits::PROJECT_NAME),
        description: prose_field(obj.get("description"), limits::PROJECT_DESCRIPTION),
        goals: prose_field(obj.get("goals"), limits::PROJECT_PROSE),
        why: prose_field(obj.get("why"), limits::PROJECT_PROSE),
        target_users: prose_field(obj.get("target_users"), limits::PROJECT_PROSE),
    }
}

/// Returns `None` for entries that cannot become a task.
fn normalize_task(value: &Value) -> Option<ExtractedTask> {
    let obj = value.as_object()?;
    let title = string_field(obj.get("title"), limits::TASK_TITLE);
    let description = string_field(obj.get("description"), limits::TASK_DESCRIPTION);
    if title.is_empty() || description.is_empty() {
        return None;
    }

    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|s| s.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or_default();

    let dependencies = ["depends_on", "dependency_titles", "dependencies"]
        .iter()
        .find_map(|key| obj.get(*key));

    Some(ExtractedTask {
        title,
        description,
        priority,
        estimated_hours: hours_field(obj.get("estimated_hours")),
        tags: string_list(obj.get("tags"), limits::TAGS_PER_TASK, limits::TAG),
        dependency_titles: string_list(
            dependencies,
            limits::DEPENDENCIES_PER_TASK,
            limits::TASK_TITLE,
        ),
        acceptance_criteria: string_list(
            obj.get("acceptance_criteria"),
            limits::ACCEPTANCE_CRITERIA_PER_TASK,
            limits::ACCEPTANCE_CRITERION,
        ),
    })
}

fn normalize_documentation(obj: &Map<String, Value>) -> ExtractedDocumentationItem {
    ExtractedDocumentationItem {
        doc_type: obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().to_ascii_lowercase().parse().ok())
            .unwrap_or_default(),
        title: string_field(obj.get("title"), limits::DOC_TITLE),
        content: string_field(obj.get("content"), limits::DOC_CONTENT),
    }
}

/// Hours in `(0, MAX_HOURS]`, rounded up to a whole hour. Anything else,
/// including non-numbers, is absent.
fn hours_field(value: Option<&Value>) -> Option<u32> {
    let hours = value?.as_f64()?;
    if !hours.is_finite() || hours <= 0.0 || hours > f64::from(limits::MAX_HOURS) {
        return None;
    }
    Some(hours.ceil() as u32)
}

/// Trim, collapse internal whitespace, and cap at `max` characters.
pub fn clean_text(s: &str, max: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max).collect();
    truncated.trim_end().to_owned()
}

fn string_field(value: Option<&Value>, max: usize) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| clean_text(s, max))
        .unwrap_or_default()
}

/// Like [`string_field`], but a list of strings is joined with `"; "`.
fn prose_field(value: Option<&Value>, max: usize) -> String {
    match value {
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            clean_text(&joined, max)
        }
        other => string_field(other, max),
    }
}

/// Keep string entries only, clean each, drop empties, cap the count.
/// A bare string is treated as a one-element list.
fn string_list(value: Option<&Value>, max_items: usize, max_len: usize) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::String(_)) => vec![v],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(|s| clean_text(s, max_len))
        .filter(|s| !s.is_empty())
        .take(max_items)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn single_task(task: Value) -> Map<String, Value> {
        obj(json!({ "tasks": [task] }))
    }

    fn renormalize(result: &ParsedResult) -> ParsedResult {
        let value = serde_json::to_value(result).unwrap();
        normalize(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn negative_hours_become_absent() {
        let raw = single_task(json!({
            "title": "Setup DB", "description": "Create schema", "estimated_hours": -5
        }));
        let result = normalize(&raw).unwrap();
        assert_eq!(result.tasks[0].estimated_hours, None);
    }

    #[test]
    fn hours_bounds() {
        for (input, expected) in [
            (json!(0), None),
            (json!(1000), Some(1000)),
            (json!(1001), None),
            (json!(0.25), Some(1)),
            (json!(7.5), Some(8)),
            (json!("8"), None),
            (json!(null), None),
        ] {
            let raw = single_task(json!({
                "title": "T", "description": "D", "estimated_hours": input
            }));
            let result = normalize(&raw).unwrap();
            assert_eq!(
                result.tasks[0].estimated_hours, expected,
                "estimated_hours input {input}"
            );
        }
    }

    #[test]
    fn unknown_priority_becomes_medium() {
        let raw = single_task(json!({
            "title": "T", "description": "D", "priority": "critical"
        }));
        assert_eq!(normalize(&raw).unwrap().tasks[0].priority, Priority::Medium);
    }

    #[test]
    fn priority_matching_ignores_case_and_padding() {
        let raw = single_task(json!({
            "title": "T", "description": "D", "priority": "  HIGH "
        }));
        assert_eq!(normalize(&raw).unwrap().tasks[0].priority, Priority::High);
    }

    #[test]
    fn missing_priority_defaults_to_medium() {
        let raw = single_task(json!({"title": "T", "description": "D"}));
        assert_eq!(normalize(&raw).unwrap().tasks[0].priority, Priority::Medium);
    }

    #[test]
    fn tasks_without_title_or_description_are_dropped() {
        let raw = obj(json!({
            "tasks": [
                {"title": "Keep", "description": "kept"},
                {"title": "   ", "description": "blank title"},
                {"title": "No description"},
                {"description": "no title"},
                {"title": 42, "description": "numeric title"},
                "not an object"
            ]
        }));
        let result = normalize(&raw).unwrap();
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].title, "Keep");
    }

    #[test]
    fn strings_are_trimmed_collapsed_and_truncated() {
        let long_title = format!("  Build   the\n\tthing {}", "x".repeat(600));
        let raw = single_task(json!({"title": long_title, "description": " a \n b "}));
        let task = &normalize(&raw).unwrap().tasks[0];
        assert!(task.title.starts_with("Build the thing x"));
        assert_eq!(task.title.chars().count(), limits::TASK_TITLE);
        assert_eq!(task.description, "a b");
    }

    #[test]
    fn truncation_does_not_leave_trailing_space() {
        assert_eq!(clean_text("abc def", 4), "abc");
        assert_eq!(clean_text("abc def", 7), "abc def");
    }

    #[test]
    fn lists_drop_non_strings_and_cap_counts() {
        let tags: Vec<Value> = (0..15).map(|i| json!(format!("tag{i}"))).collect();
        let mut mixed = vec![json!(1), json!(null), json!("  ok  "), json!("")];
        mixed.extend(tags);
        let raw = single_task(json!({
            "title": "T",
            "description": "D",
            "tags": mixed,
            "acceptance_criteria": (0..12).map(|i| format!("c{i}")).collect::<Vec<_>>(),
            "depends_on": (0..25).map(|i| format!("dep{i}")).collect::<Vec<_>>(),
        }));
        let task = &normalize(&raw).unwrap().tasks[0];
        assert_eq!(task.tags.len(), limits::TAGS_PER_TASK);
        assert_eq!(task.tags[0], "ok");
        assert_eq!(task.acceptance_criteria.len(), limits::ACCEPTANCE_CRITERIA_PER_TASK);
        assert_eq!(task.dependency_titles.len(), limits::DEPENDENCIES_PER_TASK);
    }

    #[test]
    fn long_tags_are_truncated() {
        let raw = single_task(json!({
            "title": "T", "description": "D", "tags": ["y".repeat(80)]
        }));
        assert_eq!(normalize(&raw).unwrap().tasks[0].tags[0].len(), limits::TAG);
    }

    #[test]
    fn dependency_key_aliases_are_accepted() {
        for key in ["depends_on", "dependency_titles", "dependencies"] {
            let raw = single_task(json!({"title": "T", "description": "D", key: ["A"]}));
            assert_eq!(
                normalize(&raw).unwrap().tasks[0].dependency_titles,
                vec!["A".to_owned()],
                "key {key}"
            );
        }
    }

    #[test]
    fn unknown_documentation_type_becomes_notes() {
        let raw = obj(json!({
            "documentation": [
                {"type": "roadmap", "title": "Later", "content": "stuff"},
                {"type": "target_users", "title": "Who", "content": "devs"},
                {"title": "Untyped", "content": "x"},
                7
            ]
        }));
        let docs = normalize(&raw).unwrap().documentation;
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].doc_type, DocumentationType::Notes);
        assert_eq!(docs[1].doc_type, DocumentationType::TargetUsers);
        assert_eq!(docs[2].doc_type, DocumentationType::Notes);
    }

    #[test]
    fn missing_every_section_is_an_error() {
        let raw = obj(json!({"summary": "nothing useful", "tasks": null}));
        assert_eq!(normalize(&raw), Err(ParseError::MissingSections));
    }

    #[test]
    fn partial_sections_default_the_rest() {
        let raw = obj(json!({"suggested_tags": ["backend"]}));
        let result = normalize(&raw).unwrap();
        assert_eq!(result.project_info, ExtractedProjectInfo::default());
        assert!(result.tasks.is_empty());
        assert!(result.documentation.is_empty());
        assert_eq!(result.suggested_tags, vec!["backend".to_owned()]);
    }

    #[test]
    fn project_info_lists_are_joined() {
        let raw = obj(json!({
            "project_info": {
                "name": "  Shop  ",
                "goals": ["Sell things", "  Ship fast "],
                "why": 12
            }
        }));
        let info = normalize(&raw).unwrap().project_info;
        assert_eq!(info.name, "Shop");
        assert_eq!(info.goals, "Sell things; Ship fast");
        assert_eq!(info.why, "");
    }

    #[test]
    fn suggested_tags_capped_at_twenty() {
        let tags: Vec<String> = (0..30).map(|i| format!("t{i}")).collect();
        let raw = obj(json!({"suggested_tags": tags}));
        assert_eq!(
            normalize(&raw).unwrap().suggested_tags.len(),
            limits::SUGGESTED_TAGS
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = obj(json!({
            "project_info": {"name": " A   b ", "description": "x".repeat(3000), "goals": ["g1", "g2"]},
            "tasks": [
                {
                    "title": "  Setup\tDB ", "description": "Create   schema",
                    "priority": "URGENT", "estimated_hours": 2.2,
                    "tags": ["db", 3, "  infra "], "depends_on": "Other",
                    "acceptance_criteria": ["works", "z".repeat(250)]
                },
                {"title": "Create API", "description": "REST", "priority": "critical", "estimated_hours": -1},
                {"title": "", "description": "dropped"}
            ],
            "documentation": [{"type": "WHY", "title": "t".repeat(300), "content": " c "}],
            "suggested_tags": ["a", "", 5]
        }));
        let once = normalize(&raw).unwrap();
        let twice = renormalize(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.tasks.len(), 2);
    }

    #[test]
    fn documentation_without_content_is_kept_empty() {
        let raw = obj(json!({"documentation": [
            {"type": "notes", "title": "Blank", "content": "   "},
            {"type": "goals", "title": "Numeric", "content": 42},
            {"type": "why", "title": "Missing"}
        ]}));
        let docs = normalize(&raw).unwrap().documentation;
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.content.is_empty()));
        assert_eq!(docs[1].doc_type, DocumentationType::Goals);
    }

    #[test]
    fn enums_roundtrip_through_display() {
        for p in Priority::ALL {
            assert_eq!(p.to_string().parse::<Priority>().unwrap(), p);
        }
        for d in DocumentationType::ALL {
            assert_eq!(d.to_string().parse::<DocumentationType>().unwrap(), d);
        }
        assert!("critical".parse::<Priority>().is_err());
    }
}
