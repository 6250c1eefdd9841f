//! Cheap, offline pre-check of a requirements document.
//!
//! Looks for keywords that suggest the document covers goals, motivation,
//! users and actionable work. Never calls the provider.

use serde::Serialize;

use crate::pipeline::{MAX_DOCUMENT_CHARS, MIN_DOCUMENT_CHARS};

const GOAL_KEYWORDS: &[&str] = &["goal", "objective", "aim", "purpose", "vision"];
const WHY_KEYWORDS: &[&str] = &["why", "because", "problem", "motivation", "reason", "rationale"];
const USER_KEYWORDS: &[&str] = &["user", "customer", "audience", "persona", "stakeholder"];
const TASK_KEYWORDS: &[&str] = &[
    "task",
    "feature",
    "implement",
    "build",
    "requirement",
    "must",
    "should",
    "deliverable",
];

/// Result of [`validate_shape`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeReport {
    /// Length is in bounds and the document mentions actionable work.
    pub is_valid: bool,
    /// Fraction of the four sections detected, in `[0, 1]`.
    pub completeness_score: f64,
    pub issues: Vec<String>,
}

/// Heuristically check whether `document_text` looks parseable.
pub fn validate_shape(document_text: &str) -> ShapeReport {
    let trimmed = document_text.trim();
    let len = trimmed.chars().count();
    let lower = trimmed.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    let mut issues = Vec::new();
    let length_ok = (MIN_DOCUMENT_CHARS..=MAX_DOCUMENT_CHARS).contains(&len);
    if len < MIN_DOCUMENT_CHARS {
        issues.push(format!(
            "document is too short ({len} characters, minimum {MIN_DOCUMENT_CHARS})"
        ));
    } else if len > MAX_DOCUMENT_CHARS {
        issues.push(format!(
            "document is too long ({len} characters, maximum {MAX_DOCUMENT_CHARS})"
        ));
    }

    let sections = [
        (GOAL_KEYWORDS, "no project goals or objectives found"),
        (WHY_KEYWORDS, "no problem statement or motivation found"),
        (USER_KEYWORDS, "no target users or audience found"),
        (TASK_KEYWORDS, "no tasks, features, or requirements found"),
    ];
    let mut found = 0usize;
    for (keywords, issue) in sections {
        if mentions(keywords) {
            found += 1;
        } else {
            issues.push(issue.to_owned());
        }
    }

    ShapeReport {
        is_valid: length_ok && mentions(TASK_KEYWORDS),
        completeness_score: found as f64 / sections.len() as f64,
        issues,
    }
}
