use std::collections::BTreeMap;

use crate::region::RegionDescriptor;

/// Placeholder written into text fields the assessment step did not supply
pub const PLACEHOLDER: &str = "Not specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[serde(alias = "MED")]
    Medium,
    High,
    #[default]
    Unknown,
}

impl Severity {
    /// Tolerant parse of model-produced severity labels (case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '.')
            .to_uppercase();
        match cleaned.as_str() {
            "HIGH" | "CRITICAL" => Some(Severity::High),
            "MEDIUM" | "MED" | "MODERATE" => Some(Severity::Medium),
            "LOW" | "OK" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured risk assessment for one analyzed feature description.
///
/// Every field is always present; absent model output leaves the placeholder.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ComplianceRecord {
    pub geolocation: String,
    pub law: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub confidence: String,
    pub reasoning: String,
    pub potential_violations: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub evidence: String,
    pub recommendations: String,
    pub legal_references: Vec<String>,
}

impl Default for ComplianceRecord {
    fn default() -> Self {
        Self {
            geolocation: String::new(),
            law: PLACEHOLDER.to_string(),
            severity: Severity::Unknown,
            confidence: String::new(),
            reasoning: PLACEHOLDER.to_string(),
            potential_violations: PLACEHOLDER.to_string(),
            evidence: String::new(),
            recommendations: PLACEHOLDER.to_string(),
            legal_references: Vec::new(),
        }
    }
}

impl ComplianceRecord {
    /// Record returned when structuring itself fails; severity is forced to HIGH
    pub fn failure(message: &str) -> Self {
        Self {
            severity: Severity::High,
            reasoning: format!("Error processing response: {}", message),
            ..Self::default()
        }
    }

    pub fn has_geolocation(&self) -> bool {
        let geo = self.geolocation.trim();
        !geo.is_empty() && geo != PLACEHOLDER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GeoComplianceFlag {
    #[serde(rename = "REQUIRED")]
    Required,
    #[serde(rename = "NOT REQUIRED")]
    NotRequired,
}

impl GeoComplianceFlag {
    pub fn from_geolocation(geolocation: &str) -> Self {
        let geo = geolocation.trim();
        if geo.is_empty() || geo == PLACEHOLDER {
            GeoComplianceFlag::NotRequired
        } else {
            GeoComplianceFlag::Required
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoComplianceFlag::Required => "REQUIRED",
            GeoComplianceFlag::NotRequired => "NOT REQUIRED",
        }
    }
}

/// Flattened projection of a record used for tabular export
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryRow {
    pub geolocation: String,
    pub severity: Severity,
    pub law: String,
    pub reasoning: String,
    pub potential_violations: String,
    pub recommendations: String,
    pub legal_references: Vec<String>,
    pub geo_compliance_flag: GeoComplianceFlag,
    /// Ad hoc columns reported by the summarizer, appended after the fixed set
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// How the assessment response was turned into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuringQuality {
    /// Decoded from a JSON object (bare or fenced)
    Structured,
    /// Recovered field-by-field from `key: value` lines
    Recovered,
    /// Prose without any recognized field
    Unstructured,
    /// Structuring failed; the fixed failure record was returned
    Failed,
}

impl StructuringQuality {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, StructuringQuality::Structured)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisReport {
    pub question: String,
    pub normalized_text: String,
    pub region: RegionDescriptor,
    pub matched_regions: Vec<String>,
    pub analysis: ComplianceRecord,
    pub structuring: StructuringQuality,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of one analysis, tagged by `status`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResponse {
    Success(AnalysisReport),
    Error(ErrorEnvelope),
}

impl AnalysisResponse {
    pub fn record(&self) -> Option<&ComplianceRecord> {
        match self {
            AnalysisResponse::Success(report) => Some(&report.analysis),
            AnalysisResponse::Error(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResponse::Success(_))
    }
}
