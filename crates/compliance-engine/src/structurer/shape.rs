//! Classification of raw assessment output

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    /// A fenced block, with or without a `json` tag
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[ \t]*(?i:json)?[ \t]*\r?\n?(.*?)```").unwrap();

    /// A fenced block holding a JSON array, possibly surrounded by prose
    static ref FENCED_ARRAY: Regex = Regex::new(r"(?s)```[ \t]*(?i:json)?\s*(\[.*?\])\s*```").unwrap();

    /// Any fence marker, opening or closing
    static ref FENCE_MARKER: Regex = Regex::new(r"```[ \t]*(?i:json)?").unwrap();
}

/// Shape of one assessment response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// A JSON object, bare or embedded in prose
    StructuredObject(Map<String, Value>),
    /// A JSON object inside a fenced block
    FencedJson(Map<String, Value>),
    /// Fence-stripped text with no decodable object
    PlainText(String),
}

/// Resolve the shape of a response by ordered attempts.
///
/// 1. a fenced block whose body is a JSON object
/// 2. fence-stripped text starting with `{` (or an array of objects)
/// 3. the outermost `{...}` fragment embedded in prose
/// 4. plain text
pub fn classify(raw: &str) -> ResponseShape {
    for body in fenced_blocks(raw) {
        if let Some(object) = parse_object(body) {
            return ResponseShape::FencedJson(object);
        }
    }

    let cleaned = strip_fences(raw);
    if cleaned.starts_with('{') || cleaned.starts_with('[') {
        if let Some(object) = parse_object(&cleaned) {
            return ResponseShape::StructuredObject(object);
        }
    }

    if let Some(object) = object_fragment(&cleaned).and_then(parse_object) {
        return ResponseShape::StructuredObject(object);
    }

    ResponseShape::PlainText(cleaned)
}

/// Remove every fence marker and trim
pub fn strip_fences(raw: &str) -> String {
    FENCE_MARKER.replace_all(raw, "").trim().to_string()
}

/// Bodies of all fenced blocks, in order
pub fn fenced_blocks(raw: &str) -> impl Iterator<Item = &str> {
    FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

pub fn fenced_array(raw: &str) -> Option<&str> {
    FENCED_ARRAY
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// First `[` through last `]`, when the array opens before any object
pub fn array_fragment(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    if text.find('{').is_some_and(|brace| brace < start) {
        return None;
    }
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// First `{` through last `}`
pub fn object_fragment(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// First `{` or `[` through last `}` or `]`
pub fn json_fragment(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end > start).then(|| &text[start..=end])
}

/// Decode `text` as a JSON object; an array yields its first object
fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(object) => Some(object),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(object) => Some(object),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        assert!(matches!(
            classify(r#"{"severity": "HIGH"}"#),
            ResponseShape::StructuredObject(_)
        ));
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let raw = "Here is the analysis:\n```json\n{\"law\": \"COPPA\"}\n```\nThanks.";
        match classify(raw) {
            ResponseShape::FencedJson(object) => assert_eq!(object["law"], "COPPA"),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_untagged_fence() {
        assert!(matches!(
            classify("```\n{\"law\": \"GDPR\"}\n```"),
            ResponseShape::FencedJson(_)
        ));
    }

    #[test]
    fn test_object_embedded_in_prose() {
        match classify("Result follows {\"law\": \"DSA\"} end") {
            ResponseShape::StructuredObject(object) => assert_eq!(object["law"], "DSA"),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_is_fence_stripped() {
        assert_eq!(
            classify("```\nSeverity: HIGH\n```"),
            ResponseShape::PlainText("Severity: HIGH".to_string())
        );
    }

    #[test]
    fn test_fenced_array_in_prose() {
        let raw = "Rows:\n```json\n[{\"law\": \"A\"}, {\"law\": \"B\"}]\n```\ndone";
        assert_eq!(
            fenced_array(raw),
            Some("[{\"law\": \"A\"}, {\"law\": \"B\"}]")
        );
    }

    #[test]
    fn test_array_fragment_skips_arrays_nested_in_objects() {
        assert_eq!(array_fragment("rows: [1, 2] trailing"), Some("[1, 2]"));
        assert_eq!(array_fragment("{\"refs\": [\"a\"]}"), None);
    }

    #[test]
    fn test_fragments_need_both_ends() {
        assert_eq!(object_fragment("} nothing {"), None);
        assert_eq!(json_fragment("no json here"), None);
    }
}
