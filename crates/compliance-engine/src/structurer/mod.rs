//! Response structurer
//!
//! Turns the free-form output of the assessment service into a
//! [`ComplianceRecord`]. Output shape is not guaranteed (plain text, bare
//! JSON, fenced JSON, JSON with a preamble), so each attempt is more
//! permissive than the last. Fields that cannot be found keep their
//! placeholder; nothing is invented.

mod fields;
mod shape;

pub(crate) use fields::{value_list, value_text};
pub use shape::{classify, strip_fences, ResponseShape};

use serde_json::{Map, Value};
use shared_types::{ComplianceRecord, StructuringQuality};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix marking a record whose reasoning is the raw, unparsed response
pub const UNSTRUCTURED_PREFIX: &str = "Unstructured response: ";

#[derive(Debug, Error)]
pub enum StructuringError {
    #[error("empty response")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response holds neither a JSON array nor an object")]
    NoRows,
}

/// A record plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    pub record: ComplianceRecord,
    pub quality: StructuringQuality,
}

/// Structure one assessment response. Never fails.
///
/// Structuring errors produce the failure record: severity HIGH and the
/// error embedded in the reasoning.
pub fn structure(raw: &str) -> StructuredRecord {
    match try_structure(raw) {
        Ok(structured) => {
            debug!("Structured response as {:?}", structured.quality);
            structured
        }
        Err(err) => {
            warn!("Failed to structure response: {}", err);
            StructuredRecord {
                record: ComplianceRecord::failure(&err.to_string()),
                quality: StructuringQuality::Failed,
            }
        }
    }
}

fn try_structure(raw: &str) -> Result<StructuredRecord, StructuringError> {
    if raw.trim().is_empty() {
        return Err(StructuringError::Empty);
    }

    let mut record = ComplianceRecord::default();
    let text = match classify(raw) {
        ResponseShape::StructuredObject(object) | ResponseShape::FencedJson(object) => {
            if fields::apply_object(&mut record, &object) > 0 {
                return Ok(StructuredRecord {
                    record,
                    quality: StructuringQuality::Structured,
                });
            }
            warn!("Decoded JSON object has no recognized field");
            Value::Object(object).to_string()
        }
        ResponseShape::PlainText(text) => {
            if fields::apply_lines(&mut record, &text) > 0 {
                return Ok(StructuredRecord {
                    record,
                    quality: StructuringQuality::Recovered,
                });
            }
            if text.starts_with('{') || text.starts_with('[') {
                serde_json::from_str::<Value>(&text)?;
            }
            text
        }
    };

    record.reasoning = format!("{UNSTRUCTURED_PREFIX}{}", text.trim());
    Ok(StructuredRecord {
        record,
        quality: StructuringQuality::Unstructured,
    })
}

/// Decode a response expected to be JSON, tolerating fences and prose
pub fn decode_json_value(raw: &str) -> Result<Value, StructuringError> {
    if raw.trim().is_empty() {
        return Err(StructuringError::Empty);
    }
    for body in shape::fenced_blocks(raw) {
        if let Ok(value) = serde_json::from_str(body) {
            return Ok(value);
        }
    }

    let cleaned = strip_fences(raw);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(err) => shape::json_fragment(&cleaned)
            .and_then(|fragment| serde_json::from_str(fragment).ok())
            .ok_or(StructuringError::Json(err)),
    }
}

/// Structure a list-shaped response into row objects.
///
/// Tries a fenced JSON array, then the first bracketed array in the text,
/// then a single object. Non-object array items are dropped.
pub fn structure_rows(raw: &str) -> Result<Vec<Map<String, Value>>, StructuringError> {
    if raw.trim().is_empty() {
        return Err(StructuringError::Empty);
    }

    let candidates = [shape::fenced_array(raw), shape::array_fragment(raw)];
    let decoded = candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok());
    let value = match decoded {
        Some(value) => value,
        None => decode_json_value(raw)?,
    };

    match value {
        Value::Array(items) => {
            let total = items.len();
            let rows: Vec<_> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(object) => Some(object),
                    _ => None,
                })
                .collect();
            if rows.len() < total {
                debug!("Dropped {} non-object rows", total - rows.len());
            }
            Ok(rows)
        }
        Value::Object(object) => Ok(vec![object]),
        _ => Err(StructuringError::NoRows),
    }
}
