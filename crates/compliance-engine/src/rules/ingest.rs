//! Offline merge step of the rules ingestion flow
//!
//! Each crawled statute page is turned into a YAML document by the
//! extraction prompt. Documents are merged into the store under the
//! region named by `source.jurisdiction`.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use super::store::RulesStore;

lazy_static! {
    static ref LEADING_FENCE: Regex = Regex::new(r"(?i)^```\s*(?:yaml|yml)?\s*").unwrap();
    static ref TRAILING_FENCE: Regex = Regex::new(r"\s*```\s*$").unwrap();
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Extracted document has no source.jurisdiction")]
    MissingJurisdiction,

    #[error("Extracted document is not a mapping")]
    NotAMapping,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Remove a leading ```yaml fence and a trailing ``` fence
pub fn strip_yaml_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = LEADING_FENCE.replace(trimmed, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

impl RulesStore {
    /// Merge one extracted YAML document, returning the region it was filed under.
    ///
    /// Every top-level key of the document overwrites the same key of the
    /// region's existing entry.
    pub fn merge_extracted(&mut self, yaml_text: &str) -> Result<String, RulesError> {
        let cleaned = strip_yaml_fences(yaml_text);
        let document: Value = serde_yaml::from_str(&cleaned)?;
        let Value::Object(document) = document else {
            return Err(RulesError::NotAMapping);
        };

        let region = document
            .get("source")
            .and_then(|source| source.get("jurisdiction"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(RulesError::MissingJurisdiction)?
            .to_string();

        let entry = self
            .geo
            .entry(region.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(target) = entry {
            for (key, value) in document {
                target.insert(key, value);
            }
        }

        info!("Merged extracted rules into region {}", region);
        Ok(region)
    }

    pub fn to_yaml(&self) -> Result<String, RulesError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Persist the store as YAML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RulesError> {
        let path = path.as_ref();
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
