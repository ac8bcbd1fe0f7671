use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::RegionDescriptor;
use tracing::debug;

use super::ingest::RulesError;
use crate::error::{EngineError, Result};

/// Persisted, region-keyed corpus of legal obligations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesStore {
    /// Rules keyed by region name (continent, country or `COUNTRY-STATE`)
    #[serde(default)]
    pub geo: Map<String, Value>,
    /// Source documents keyed by region name
    #[serde(default)]
    pub sources: Map<String, Value>,
    /// Any other scope, carried through load and save untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Rules merged for one region descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicableRules {
    pub rules: Map<String, Value>,
    /// Region keys that matched, in application order
    pub matched_regions: Vec<String>,
}

impl ApplicableRules {
    /// No region matched; a valid outcome for jurisdictions without ingested rules
    pub fn is_empty(&self) -> bool {
        self.matched_regions.is_empty()
    }

    /// YAML rendering used as the knowledge-base snippet of the prompt
    pub fn to_yaml(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let value = Value::Object(self.rules.clone());
        serde_yaml::to_string(&value).unwrap_or_else(|_| {
            serde_json::to_string_pretty(&value).unwrap_or_default()
        })
    }
}

/// Probe keys in application order: continent, then country, then state.
///
/// Later probes override earlier ones, so state rules win over country
/// rules, which win over continent rules.
pub fn probe_keys(region: &RegionDescriptor) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::with_capacity(3);
    for field in [&region.continent, &region.country, &region.state] {
        if let Some(key) = field.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

impl RulesStore {
    pub fn from_yaml_str(s: &str) -> std::result::Result<Self, RulesError> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> std::result::Result<Self, RulesError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let what = format!("rules store {}", path.display());
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::config_load(&what, e))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        };
        parsed.map_err(|e| EngineError::config_load(what, e))
    }

    pub fn region_count(&self) -> usize {
        self.geo.len()
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.geo.keys().map(String::as_str)
    }

    /// Merge the rules of every region the descriptor names.
    ///
    /// Keys are matched exactly against the `geo` scope; unknown keys are
    /// skipped. Object payloads are shallow-merged, any other payload is
    /// inserted under its region key.
    pub fn lookup(&self, region: &RegionDescriptor) -> ApplicableRules {
        let mut applicable = ApplicableRules::default();

        for key in probe_keys(region) {
            match self.geo.get(key) {
                Some(Value::Object(payload)) => {
                    for (field, value) in payload {
                        applicable.rules.insert(field.clone(), value.clone());
                    }
                    applicable.matched_regions.push(key.to_string());
                }
                Some(other) => {
                    applicable.rules.insert(key.to_string(), other.clone());
                    applicable.matched_regions.push(key.to_string());
                }
                None => debug!("No rules for region {}", key),
            }
        }

        debug!(
            "Rules lookup matched {:?} ({} keys)",
            applicable.matched_regions,
            applicable.rules.len()
        );
        applicable
    }
}
