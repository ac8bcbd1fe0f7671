//! Prompt catalog and template composition

use std::collections::BTreeMap;
use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{EngineError, Result};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").unwrap();
}

/// Name of the fallback prompt used when an agent has no dedicated entry
pub const BASE_PROMPT: &str = "base";
pub const INTAKE_PROMPT: &str = "intake_agent";
pub const QA_TEMPLATE: &str = "qa_user_template";
pub const SUMMARY_PROMPT: &str = "summary_agent";
pub const SUMMARY_CSV_PROMPT: &str = "summary_csv_agent";

#[derive(Debug, Clone, Deserialize)]
struct PromptDocument {
    prompts: BTreeMap<String, String>,
}

/// Named system prompts and user templates
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: BTreeMap<String, String>,
}

impl PromptCatalog {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let doc: PromptDocument =
            serde_yaml::from_str(s).map_err(|e| EngineError::config_load("prompt catalog", e))?;
        if !doc.prompts.contains_key(BASE_PROMPT) {
            return Err(EngineError::config_load(
                "prompt catalog",
                "missing `base` prompt",
            ));
        }
        Ok(Self {
            prompts: doc.prompts,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config_load(format!("prompt catalog {}", path.display()), e)
        })?;
        Self::from_yaml_str(&content)
    }

    /// Prompt for an agent, falling back to `base`
    pub fn get(&self, name: &str) -> &str {
        self.prompts
            .get(name)
            .or_else(|| self.prompts.get(BASE_PROMPT))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prompts.contains_key(name)
    }
}

/// Values substituted into the QA template
#[derive(Debug, Clone, Default)]
pub struct PromptContext<'a> {
    /// `YYYY-MM-DD`
    pub date: Option<&'a str>,
    pub jurisdiction_hint: Option<&'a str>,
    pub raw_text: Option<&'a str>,
    pub kb_snippet: Option<&'a str>,
}

impl PromptContext<'_> {
    fn value(&self, placeholder: &str) -> Option<&str> {
        match placeholder {
            "YYYY_MM_DD" | "DATE" => Some(self.date.unwrap_or_default()),
            "JURISDICTION_HINT" => Some(self.jurisdiction_hint.unwrap_or_default()),
            "RAW_USER_INPUT" => Some(self.raw_text.unwrap_or_default()),
            "KB_YAML_SNIPPETS" => Some(self.kb_snippet.unwrap_or_default()),
            _ => None,
        }
    }
}

/// Substitute `{PLACEHOLDER}` markers.
///
/// Missing optional values become empty strings; unknown placeholders are
/// left as written.
pub fn compose(template: &str, context: &PromptContext<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match context.value(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
