//! JSON extraction from free-form model output.
//!
//! Model responses are fragile: fenced code blocks, prose around the
//! payload, trailing commas, stray comment lines. The extractor works
//! through progressively more lenient strategies and only gives up when
//! none of them yields parseable JSON:
//!
//! 1. contents of a ```` ```json ```` (or bare ```` ``` ````) fence
//! 2. first balanced `{...}` found by a string-aware brace walk
//! 3. greedy `{.*}` regex match
//! 4. line-based brace-balance scan that skips leading comment lines
//!
//! Trailing commas before `}` / `]` are removed before every parse
//! attempt. The functions here are pure; all I/O-facing behavior lives in
//! the synthesizer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{BraidQLError, Result};

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern is valid"));

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("greedy object pattern is valid"));

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("json fence pattern is valid")
});

static FENCED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("fence pattern is valid"));

/// Remove a leading `<thought>...</thought>` block.
///
/// Returns the remaining text and the thought content, when present.
#[must_use]
pub fn strip_thought_block(text: &str) -> (String, Option<String>) {
    let Some(open) = text.find("<thought>") else {
        return (text.to_string(), None);
    };
    let Some(close) = text.find("</thought>") else {
        return (text.to_string(), None);
    };
    if close < open {
        return (text.to_string(), None);
    }

    let thought = text[open + "<thought>".len()..close].trim().to_string();
    let mut remaining = String::with_capacity(text.len());
    remaining.push_str(&text[..open]);
    remaining.push_str(&text[close + "</thought>".len()..]);
    (remaining.trim().to_string(), Some(thought))
}

/// Extract the first JSON object from free-form model output.
///
/// # Errors
///
/// Returns [`BraidQLError::InvalidJson`] with a bounded excerpt when no
/// strategy yields parseable JSON.
pub fn extract_json(text: &str) -> Result<Value> {
    // Prefer fenced content when the model wrapped its answer.
    let candidate = fenced_block(text).unwrap_or(text);

    // Primary path: string-aware balanced-brace walk.
    if let Some(object) = balanced_object(candidate) {
        if let Ok(value) = parse_cleaned(object) {
            return Ok(value);
        }
    }

    // Lenient fallback: greedy match across the whole candidate.
    if let Some(found) = GREEDY_OBJECT.find(candidate) {
        if let Ok(value) = parse_cleaned(found.as_str()) {
            return Ok(value);
        }
    }

    // Last resort: line-based scan that tolerates leading comment lines.
    if let Some(block) = line_balanced_block(candidate) {
        if let Ok(value) = parse_cleaned(&block) {
            return Ok(value);
        }
    }

    let excerpt: String = text.chars().take(200).collect();
    Err(BraidQLError::InvalidJson {
        message: format!("No parseable JSON object in model response: {excerpt}"),
    })
}

fn parse_cleaned(text: &str) -> std::result::Result<Value, serde_json::Error> {
    let cleaned = TRAILING_COMMA.replace_all(text.trim(), "$1");
    serde_json::from_str(&cleaned)
}

fn fenced_block(text: &str) -> Option<&str> {
    if text.contains("```json") {
        return FENCED_JSON.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str());
    }
    if text.contains("```") {
        return FENCED_ANY.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str());
    }
    None
}

/// Find the first balanced `{...}` region, honoring string literals and
/// backslash escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match byte {
            b'\\' => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            },
            _ => {},
        }
    }
    None
}

/// Accumulate lines from the first `{`, skipping leading `//` comment
/// lines, until naive brace counts balance.
fn line_balanced_block(text: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut depth: i64 = 0;
    let mut started = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if !started && trimmed.starts_with("//") {
            continue;
        }
        if line.contains('{') {
            started = true;
        }
        if started {
            lines.push(line);
            depth += i64::try_from(line.matches('{').count()).unwrap_or(0);
            depth -= i64::try_from(line.matches('}').count()).unwrap_or(0);
            if depth == 0 {
                break;
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let text = "any prefix```json\n{\"x\":1}\n``` suffix";
        assert_eq!(extract_json(text).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json("{\"x\":1}").unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_trailing_comma_removed() {
        assert_eq!(extract_json("{\"x\":1,}").unwrap(), json!({"x": 1}));
        assert_eq!(extract_json("{\"xs\":[1,2,],}").unwrap(), json!({"xs": [1, 2]}));
    }

    #[test]
    fn test_surrounding_noise() {
        assert_eq!(extract_json("noise { \"x\":1 } noise").unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_bare_fence_without_language() {
        let text = "```\n{\"databases\":[]}\n```";
        assert_eq!(extract_json(text).unwrap(), json!({"databases": []}));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_the_walk() {
        let text = r#"Here you go: {"sql":"SELECT '{' || name || '}' FROM t","n":1} done"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["n"], 1);
        assert_eq!(value["sql"], "SELECT '{' || name || '}' FROM t");
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"{"q":"say \"hi\" {ok}","n":2}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_leading_comment_lines_are_skipped() {
        let text = "// model explanation\n// more\n{\n\"x\": 3\n}";
        assert_eq!(extract_json(text).unwrap(), json!({"x": 3}));
    }

    #[test]
    fn test_line_scan_recovers_from_unbalanced_comment_braces() {
        // The brace inside the comment defeats the balanced walk and the
        // greedy regex; only the line-based scan finds the real object.
        let text = "// ignore {this\n{\"x\":3}";
        assert_eq!(extract_json(text).unwrap(), json!({"x": 3}));
    }

    #[test]
    fn test_nested_objects() {
        let text = "prefix {\"a\":{\"b\":{\"c\":1}}} suffix";
        assert_eq!(extract_json(text).unwrap(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_no_json_is_an_error_with_excerpt() {
        let err = extract_json("there is nothing useful here").unwrap_err();
        match err {
            BraidQLError::InvalidJson { message } => {
                assert!(message.contains("nothing useful"));
            },
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_of_encoded_plan() {
        let plan = json!({
            "databases": ["postgres"],
            "queries": [{
                "database": "postgres",
                "query_type": "sql",
                "query": "SELECT id FROM users WHERE city=$1",
                "parameters": ["lagos"]
            }]
        });
        let encoded = serde_json::to_string(&plan).unwrap();
        assert_eq!(extract_json(&encoded).unwrap(), plan);
    }

    #[test]
    fn test_strip_thought_block() {
        let text = "<thought>users table has a city column</thought>\n{\"x\":1}";
        let (rest, thought) = strip_thought_block(text);
        assert_eq!(rest, "{\"x\":1}");
        assert_eq!(thought.as_deref(), Some("users table has a city column"));
    }

    #[test]
    fn test_strip_thought_block_absent() {
        let (rest, thought) = strip_thought_block("{\"x\":1}");
        assert_eq!(rest, "{\"x\":1}");
        assert!(thought.is_none());
    }
}
