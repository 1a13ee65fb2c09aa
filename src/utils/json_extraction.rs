//! JSON extraction utilities for parsing content-oracle responses.
//!
//! Model output is asked to be pure JSON but routinely arrives wrapped in
//! markdown fences, prefixed with prose, or cut off mid-object. Extraction
//! tries, in order:
//! 1. The whole (trimmed) text as JSON
//! 2. The body of a fenced code block (```json ... ``` or ``` ... ```)
//! 3. The first balanced `{...}` span anywhere in the text
//!
//! # Example
//!
//! ```
//! use examforge::utils::json_extraction::extract_json_value;
//!
//! let response = "Sure! Here you go: {\"items\": []} Hope that helps.";
//! let value = extract_json_value(response).unwrap();
//! assert!(value["items"].is_array());
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

fn code_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").expect("static regex is valid")
    })
}

/// Finds the index of the `}` closing the object that opens at byte 0 of `s`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Returns the body of the first fenced code block, if any.
pub fn extract_from_code_block(content: &str) -> Option<&str> {
    code_block_regex()
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the first balanced `{...}` span in `content`.
///
/// Starts at each `{` in turn so that a stray brace in leading prose does
/// not hide a well-formed object later in the text.
pub fn first_balanced_object(content: &str) -> Option<&str> {
    let mut offset = 0;
    while let Some(rel) = content[offset..].find('{') {
        let start = offset + rel;
        if let Some(end) = find_matching_brace(&content[start..]) {
            let candidate = &content[start..=start + end];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        offset = start + 1;
    }
    None
}

fn unclosed_braces(s: &str) -> usize {
    let mut depth = 0isize;
    let mut in_string = false;
    let mut escape_next = false;
    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth.max(0) as usize
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Extracts a JSON value from a model response.
pub fn extract_json_value(content: &str) -> Result<Value, JsonExtractionError> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(block) = extract_from_code_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Ok(value);
        }
    }

    if let Some(span) = first_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
    }

    if let Some(start) = trimmed.find('{') {
        let partial = &trimmed[start..];
        let open = unclosed_braces(partial);
        if open > 0 {
            return Err(JsonExtractionError::Truncated {
                partial_preview: preview(partial, 100),
                unclosed_braces: open,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}
