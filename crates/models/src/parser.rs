// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON block extraction from LLM responses.
//!
//! Handlers ask for responses "in the following JSON format"; models wrap
//! the object in a fenced block, prose, or both. The parser extracts the
//! first fenced ```json block, falling back to the first balanced object
//! in the text.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("JSON is malformed: {0}")]
    Malformed(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Extracts a JSON object from free-form model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBlockParser;

impl JsonBlockParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the first JSON object in `text`.
    pub fn parse(&self, text: &str) -> Result<Map<String, Value>, ParseError> {
        let candidate = extract_fenced_block(text)
            .or_else(|| extract_balanced_object(text))
            .ok_or(ParseError::NoJson)?;

        let value: Value = serde_json::from_str(candidate)
            .map_err(|e| ParseError::Malformed(e.to_string()))?;

        match value {
            Value::Object(map) => Ok(map),
            Value::Array(_) => Err(ParseError::NotAnObject("array")),
            Value::String(_) => Err(ParseError::NotAnObject("string")),
            Value::Number(_) => Err(ParseError::NotAnObject("number")),
            Value::Bool(_) => Err(ParseError::NotAnObject("bool")),
            Value::Null => Err(ParseError::NotAnObject("null")),
        }
    }

    /// Parse a JSON array (bulk profile generation).
    pub fn parse_array(&self, text: &str) -> Result<Vec<Value>, ParseError> {
        let candidate = extract_fenced_block(text)
            .or_else(|| extract_balanced_array(text))
            .ok_or(ParseError::NoJson)?;

        let value: Value = serde_json::from_str(candidate)
            .map_err(|e| ParseError::Malformed(e.to_string()))?;

        match value {
            Value::Array(items) => Ok(items),
            _ => Err(ParseError::NotAnObject("non-array")),
        }
    }
}

/// Contents of the first ```json (or bare ```) fenced block, if any.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn extract_balanced_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

fn extract_balanced_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

/// First balanced `open`..`close` span, string-literal aware.
fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + close.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
