//! Process-wide static knowledge
//!
//! The terminology map, region aliases, rules store and prompt catalog are
//! loaded once at startup and shared read-only between requests. Any file
//! that is configured but missing or unparseable is a `ConfigLoad` error and
//! the process must not serve.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::config::KnowledgeConfig;
use crate::error::{EngineError, Result};
use crate::jurisdiction::{AliasMap, RegionAliases};
use crate::prompts::PromptCatalog;
use crate::rules::RulesStore;
use crate::terminology::TerminologyMap;

/// Default mapping - loaded from data/mapping.json
const DEFAULT_MAPPING: &str = include_str!("../data/mapping.json");

/// Default prompt catalog - loaded from data/prompts.yaml
const DEFAULT_PROMPTS: &str = include_str!("../data/prompts.yaml");

/// Sample rules store - loaded from data/legalbook.yaml
const DEFAULT_RULES: &str = include_str!("../data/legalbook.yaml");

/// Terminology dictionary plus region alias tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub terminology: BTreeMap<String, String>,
    #[serde(default)]
    pub continent: BTreeMap<String, String>,
    #[serde(default)]
    pub country: BTreeMap<String, String>,
}

impl MappingDocument {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| EngineError::config_load("mapping document", e))
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| EngineError::config_load("mapping document", e))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config_load(format!("mapping document {}", path.display()), e)
        })?;
        if has_extension(path, "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn terminology_map(&self) -> Result<TerminologyMap> {
        TerminologyMap::new(self.terminology.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn region_aliases(&self) -> RegionAliases {
        RegionAliases {
            continents: AliasMap::new(self.continent.iter().map(|(k, v)| (k, v.clone()))),
            countries: AliasMap::new(self.country.iter().map(|(k, v)| (k, v.clone()))),
        }
    }
}

/// Read-only lookup data shared by every analysis
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub terminology: TerminologyMap,
    pub aliases: RegionAliases,
    pub rules: RulesStore,
    pub prompts: PromptCatalog,
}

impl KnowledgeBase {
    /// Build from the embedded defaults
    pub fn embedded() -> Result<Self> {
        let mapping = MappingDocument::from_json_str(DEFAULT_MAPPING)?;
        let rules = RulesStore::from_yaml_str(DEFAULT_RULES)
            .map_err(|e| EngineError::config_load("embedded rules store", e))?;
        let prompts = PromptCatalog::from_yaml_str(DEFAULT_PROMPTS)?;
        Self::from_parts(&mapping, rules, prompts)
    }

    /// Load every configured document, using embedded defaults for the rest
    pub fn load(config: &KnowledgeConfig) -> Result<Self> {
        let mapping = match &config.mapping_path {
            Some(path) => MappingDocument::load(path)?,
            None => MappingDocument::from_json_str(DEFAULT_MAPPING)?,
        };
        let rules = match &config.rules_path {
            Some(path) => RulesStore::load(path)?,
            None => RulesStore::from_yaml_str(DEFAULT_RULES)
                .map_err(|e| EngineError::config_load("embedded rules store", e))?,
        };
        let prompts = match &config.prompts_path {
            Some(path) => PromptCatalog::load(path)?,
            None => PromptCatalog::from_yaml_str(DEFAULT_PROMPTS)?,
        };
        Self::from_parts(&mapping, rules, prompts)
    }

    pub fn from_parts(
        mapping: &MappingDocument,
        rules: RulesStore,
        prompts: PromptCatalog,
    ) -> Result<Self> {
        let knowledge = Self {
            terminology: mapping.terminology_map()?,
            aliases: mapping.region_aliases(),
            rules,
            prompts,
        };
        info!(
            "Knowledge loaded: {} terms, {} continent aliases, {} country aliases, {} regions",
            knowledge.terminology.len(),
            knowledge.aliases.continents.len(),
            knowledge.aliases.countries.len(),
            knowledge.rules.region_count()
        );
        Ok(knowledge)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
