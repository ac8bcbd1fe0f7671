//! Engine configuration
//!
//! TOML file with two sections:
//!
//! ```toml
//! [knowledge]
//! mapping_path = "data/mapping.json"
//! rules_path = "data/legalbook.yaml"
//! prompts_path = "data/prompts.yaml"
//!
//! [assessment]
//! base_url = "https://generativelanguage.googleapis.com"
//! model = "gemini-2.0-flash"
//! timeout_secs = 60
//! api_key_env = "GEMINI_API_KEY"
//! ```
//!
//! Every key is optional. Knowledge paths that are not set fall back to the
//! embedded defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::assessment::GeminiConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
}

/// Where the static knowledge documents live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Terminology and region alias mapping (JSON or YAML)
    pub mapping_path: Option<PathBuf>,
    /// Rules store (YAML or JSON)
    pub rules_path: Option<PathBuf>,
    /// Prompt catalog (YAML)
    pub prompts_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse engine configuration")
    }

    /// Client settings, reading the API key from the configured variable
    pub fn gemini_config(&self) -> GeminiConfig {
        let api_key = std::env::var(&self.assessment.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        GeminiConfig {
            base_url: self.assessment.base_url.clone(),
            model: self.assessment.model.clone(),
            api_key,
            timeout_secs: self.assessment.timeout_secs,
        }
    }
}
