//! Error taxonomy for the compliance pipeline

use thiserror::Error;

use crate::assessment::AssessmentError;

/// Errors that halt the pipeline before a record can be produced.
///
/// Structuring problems never appear here; they are reported through
/// `StructuringQuality` on the returned record.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Static data (mapping, rules store, prompts) missing or unparseable at startup
    #[error("Failed to load {what}: {reason}")]
    ConfigLoad { what: String, reason: String },

    /// Region inference failed or returned unusable data
    #[error("Region resolution failed: {0}")]
    Resolution(String),

    /// The external assessment call failed
    #[error("Assessment call failed: {0}")]
    AssessmentCall(#[from] AssessmentError),

    /// Input rejected before any stage ran
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Summary stage could not produce rows
    #[error("Summary failed: {0}")]
    Summary(String),
}

impl EngineError {
    pub fn config_load(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EngineError::ConfigLoad {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
