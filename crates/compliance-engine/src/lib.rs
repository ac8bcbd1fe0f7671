//! Geo-compliance analysis pipeline
//!
//! `normalize -> resolve region -> look up rules -> compose prompt ->
//! assess -> structure`, sequenced by [`ComplianceEngine`]. Each stage needs
//! the previous stage's output, so stages run one after another; only the
//! assessment calls suspend.

pub mod assessment;
pub mod config;
pub mod error;
pub mod jurisdiction;
pub mod knowledge;
pub mod prompts;
pub mod rules;
pub mod structurer;
pub mod summary;
pub mod terminology;

use std::sync::Arc;

use shared_types::{
    AnalysisReport, AnalysisResponse, ComplianceRecord, ErrorEnvelope, StructuringQuality,
    SummaryRow,
};
use tracing::{error, info, warn};

pub use assessment::{AssessmentError, AssessmentService, GeminiClient, GeminiConfig};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use knowledge::{KnowledgeBase, MappingDocument};
pub use structurer::{structure, StructuredRecord};

use jurisdiction::RegionResolver;
use prompts::{
    compose, PromptContext, BASE_PROMPT, INTAKE_PROMPT, QA_TEMPLATE, SUMMARY_CSV_PROMPT,
    SUMMARY_PROMPT,
};
use rules::ApplicableRules;

/// Orchestrates one analysis per call over shared read-only knowledge
#[derive(Clone)]
pub struct ComplianceEngine {
    knowledge: Arc<KnowledgeBase>,
    service: Arc<dyn AssessmentService>,
}

impl ComplianceEngine {
    pub fn new(knowledge: Arc<KnowledgeBase>, service: Arc<dyn AssessmentService>) -> Self {
        Self { knowledge, service }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Analyze a feature description. Never fails: errors become an
    /// [`ErrorEnvelope`].
    pub async fn analyze(&self, text: &str, jurisdiction_hint: Option<&str>) -> AnalysisResponse {
        match self.try_analyze(text, jurisdiction_hint).await {
            Ok(report) => AnalysisResponse::Success(report),
            Err(err) => {
                error!("Analysis failed: {}", err);
                AnalysisResponse::Error(ErrorEnvelope::new(err.to_string()))
            }
        }
    }

    /// The pipeline with errors surfaced as `EngineError`
    pub async fn try_analyze(
        &self,
        text: &str,
        jurisdiction_hint: Option<&str>,
    ) -> Result<AnalysisReport> {
        let question = text.trim();
        if question.is_empty() {
            return Err(EngineError::InvalidInput("empty input".to_string()));
        }
        let hint = jurisdiction_hint.map(str::trim).filter(|h| !h.is_empty());
        let prompts = &self.knowledge.prompts;

        let normalized = self.knowledge.terminology.normalize(question);
        info!("Normalized input ({} chars)", normalized.len());

        let resolver = RegionResolver::new(
            &self.knowledge.aliases,
            self.service.as_ref(),
            prompts.get(INTAKE_PROMPT),
        );
        let region = resolver.resolve(&normalized, hint).await?;

        let applicable = self.knowledge.rules.lookup(&region);
        if applicable.is_empty() {
            info!("No ingested rules for region {}", region);
        }

        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let snippet = kb_snippet(&applicable);
        let user_text = compose(
            prompts.get(QA_TEMPLATE),
            &PromptContext {
                date: Some(&date),
                jurisdiction_hint: hint,
                raw_text: Some(&normalized),
                kb_snippet: Some(&snippet),
            },
        );

        let raw = self
            .service
            .complete(prompts.get(BASE_PROMPT), &user_text)
            .await?;

        // Geolocation stays as the model gave it; the resolved region is
        // reported separately on the report.
        let StructuredRecord { record, quality } = structure(&raw);
        match quality {
            StructuringQuality::Failed => {
                error!("Assessment response could not be structured: {}", record.reasoning)
            }
            _ if quality.is_degraded() => {
                warn!("Assessment response structured as {:?}", quality)
            }
            _ => {}
        }

        Ok(AnalysisReport {
            question: question.to_string(),
            normalized_text: normalized,
            region,
            matched_regions: applicable.matched_regions,
            analysis: record,
            structuring: quality,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Summarize stored records into rows with one summarizer call.
    ///
    /// An unparseable summarizer reply falls back to rows built from the
    /// records alone. The records' geolocation always wins.
    pub async fn summarize(&self, records: &[ComplianceRecord]) -> Result<Vec<SummaryRow>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let prompts = &self.knowledge.prompts;

        let payload = serde_json::to_string_pretty(records)
            .map_err(|e| EngineError::Summary(e.to_string()))?;
        let user_text = format!("{}\n\n{}", prompts.get(SUMMARY_CSV_PROMPT), payload);
        let raw = self
            .service
            .complete(prompts.get(SUMMARY_PROMPT), &user_text)
            .await?;

        match structurer::structure_rows(&raw) {
            Ok(rows) => {
                info!("Summarizer returned {} rows for {} records", rows.len(), records.len());
                Ok(summary::pair_rows(records, &rows))
            }
            Err(err) => {
                warn!("Summary response not structured ({}); using records", err);
                Ok(summary::rows_from_records(records))
            }
        }
    }

    /// [`summarize`](Self::summarize) rendered as CSV
    pub async fn summarize_csv(&self, records: &[ComplianceRecord]) -> Result<String> {
        let rows = self.summarize(records).await?;
        Ok(summary::to_csv(&rows))
    }
}

/// Knowledge-base snippet for the prompt; empty when nothing matched
fn kb_snippet(applicable: &ApplicableRules) -> String {
    if applicable.is_empty() {
        return String::new();
    }
    format!(
        "# matched regions: {}\n{}",
        applicable.matched_regions.join(", "),
        applicable.to_yaml()
    )
}
