//! Recover a JSON object from raw model output.
//!
//! Models are told to answer with bare JSON but routinely wrap it in prose
//! or markdown fences. [`extract_json_object`] first parses the whole text;
//! failing that it scans for a balanced `{...}` span (string- and
//! escape-aware) and parses that.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Characters of offending text kept in a [`ParseError`].
pub const EXCERPT_CHARS: usize = 200;

/// How many opening braces to try before giving up.
const MAX_CANDIDATE_SPANS: usize = 16;

/// The model's answer could not be turned into the expected structure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in model output: {excerpt:?}")]
    NoJsonObject { excerpt: String },

    #[error("model output is missing every required section (project_info, tasks, documentation, suggested_tags)")]
    MissingSections,
}

impl ParseError {
    fn no_object(raw: &str) -> Self {
        Self::NoJsonObject {
            excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

/// Parse `raw` into a JSON object, tolerating surrounding text.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(map);
    }

    let mut search_from = 0;
    for _ in 0..MAX_CANDIDATE_SPANS {
        let Some(offset) = trimmed[search_from..].find('{') else {
            break;
        };
        let start = search_from + offset;
        if let Some(end) = balanced_object_end(&trimmed[start..]) {
            let candidate = &trimmed[start..start + end];
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                debug!(start, len = candidate.len(), "extracted JSON object from wrapped output");
                return Ok(map);
            }
        }
        search_from = start + 1;
    }

    Err(ParseError::no_object(trimmed))
}

/// Byte length of the balanced `{...}` span at the start of `s`, or `None`
/// if the braces never close.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
