//! Copying recognized fields into a `ComplianceRecord`

use serde_json::{Map, Value};
use shared_types::{ComplianceRecord, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Geolocation,
    Law,
    Severity,
    Confidence,
    Reasoning,
    PotentialViolations,
    Evidence,
    Recommendations,
    LegalReferences,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        let field = match key {
            "geolocation" => Field::Geolocation,
            "law" => Field::Law,
            "severity" => Field::Severity,
            "confidence" => Field::Confidence,
            "reasoning" => Field::Reasoning,
            "potential_violations" => Field::PotentialViolations,
            "evidence" => Field::Evidence,
            "recommendations" => Field::Recommendations,
            "legal_references" | "regulations" | "citations" => Field::LegalReferences,
            _ => return None,
        };
        Some(field)
    }

    fn text_slot(self, record: &mut ComplianceRecord) -> Option<&mut String> {
        match self {
            Field::Geolocation => Some(&mut record.geolocation),
            Field::Law => Some(&mut record.law),
            Field::Confidence => Some(&mut record.confidence),
            Field::Reasoning => Some(&mut record.reasoning),
            Field::PotentialViolations => Some(&mut record.potential_violations),
            Field::Evidence => Some(&mut record.evidence),
            Field::Recommendations => Some(&mut record.recommendations),
            Field::Severity | Field::LegalReferences => None,
        }
    }
}

/// Copy the recognized, non-falsy fields of a decoded object.
///
/// Returns the number of fields written.
pub(super) fn apply_object(record: &mut ComplianceRecord, object: &Map<String, Value>) -> usize {
    let mut written = 0;
    for (key, value) in object {
        let Some(field) = Field::from_key(&key.trim().to_lowercase()) else {
            continue;
        };
        if is_falsy(value) {
            continue;
        }
        let applied = match field {
            Field::Severity => value_text(value)
                .and_then(|text| Severity::parse(&text))
                .map(|severity| record.severity = severity)
                .is_some(),
            Field::LegalReferences => set_references(record, value_list(value)),
            other => set_text(record, other, value_text(value)),
        };
        if applied {
            written += 1;
        }
    }
    written
}

/// Line-oriented recovery of `key: value` pairs.
///
/// Returns the number of fields written.
pub(super) fn apply_lines(record: &mut ComplianceRecord, text: &str) -> usize {
    let mut written = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(field) = Field::from_key(&clean_key(key)) else {
            continue;
        };
        let value = clean_value(value);
        if value.is_empty() {
            continue;
        }
        let applied = match field {
            Field::Severity => Severity::parse(&value)
                .map(|severity| record.severity = severity)
                .is_some(),
            Field::LegalReferences => {
                let refs = split_bracketed(&value).unwrap_or_else(|| vec![value.clone()]);
                set_references(record, refs)
            }
            other => set_text(record, other, Some(value)),
        };
        if applied {
            written += 1;
        }
    }
    written
}

fn set_text(record: &mut ComplianceRecord, field: Field, text: Option<String>) -> bool {
    match (field.text_slot(record), text) {
        (Some(slot), Some(text)) => {
            *slot = text;
            true
        }
        _ => false,
    }
}

fn set_references(record: &mut ComplianceRecord, refs: Vec<String>) -> bool {
    if refs.is_empty() {
        return false;
    }
    record.legal_references = refs;
    true
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Text rendering of a JSON value; lists are joined with `; `
pub(crate) fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::Bool(true) => "true".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => value.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Entries of a list-valued field; a bracketed string is split on commas
pub(crate) fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        Value::String(s) => split_bracketed(s).unwrap_or_else(|| {
            let s = s.trim();
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s.to_string()]
            }
        }),
        other => value_text(other).into_iter().collect(),
    }
}

/// Split `[a, "b", 'c']` into its entries
fn split_bracketed(value: &str) -> Option<Vec<String>> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// `**Potential Violations**` -> `potential_violations`
fn clean_key(key: &str) -> String {
    key.trim()
        .trim_matches(|c: char| {
            c.is_whitespace()
                || matches!(
                    c,
                    '"' | '\'' | '*' | '-' | '•' | '#' | '`' | '{' | '}' | ','
                )
        })
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(',')
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use shared_types::PLACEHOLDER;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_unknown_and_falsy_fields_are_skipped() {
        let mut record = ComplianceRecord::default();
        let written = apply_object(
            &mut record,
            &object(json!({
                "law": "",
                "reasoning": null,
                "legal_references": [],
                "made_up": "value",
                "geolocation": "US-CA"
            })),
        );
        assert_eq!(written, 1);
        assert_eq!(record.geolocation, "US-CA");
        assert_eq!(record.law, PLACEHOLDER);
        assert_eq!(record.reasoning, PLACEHOLDER);
    }

    #[test]
    fn test_value_coercions() {
        let mut record = ComplianceRecord::default();
        apply_object(
            &mut record,
            &object(json!({
                "confidence": 0.85,
                "potential_violations": ["targeting minors", "no consent"],
                "regulations": "[COPPA, CCPA]",
                "severity": "med"
            })),
        );
        assert_eq!(record.confidence, "0.85");
        assert_eq!(record.potential_violations, "targeting minors; no consent");
        assert_eq!(record.legal_references, vec!["COPPA", "CCPA"]);
        assert_eq!(record.severity, Severity::Medium);
    }

    #[test]
    fn test_lines_with_markdown_keys() {
        let mut record = ComplianceRecord::default();
        let written = apply_lines(
            &mut record,
            "**Severity**: HIGH\n- Potential Violations: \"unlawful profiling\",\nLaw: COPPA",
        );
        assert_eq!(written, 3);
        assert_eq!(record.severity, Severity::High);
        assert_eq!(record.potential_violations, "unlawful profiling");
        assert_eq!(record.law, "COPPA");
    }

    #[test]
    fn test_regulations_line_is_split() {
        let mut record = ComplianceRecord::default();
        apply_lines(&mut record, "Regulations: [\"COPPA\", 'CCPA', GDPR]");
        assert_eq!(record.legal_references, vec!["COPPA", "CCPA", "GDPR"]);
    }

    #[test]
    fn test_lines_without_separator_or_known_key_are_ignored() {
        let mut record = ComplianceRecord::default();
        assert_eq!(apply_lines(&mut record, "just prose\nNote: nothing"), 0);
        assert_eq!(record, ComplianceRecord::default());
    }

    #[test]
    fn test_clean_key() {
        assert_eq!(clean_key(" \"Legal References\" "), "legal_references");
        assert_eq!(clean_key("## potential-violations"), "potential_violations");
    }
}
