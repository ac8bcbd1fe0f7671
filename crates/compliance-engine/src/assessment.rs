//! Assessment service seam
//!
//! The language model is an opaque collaborator: free-text completion, or
//! completion constrained to a JSON schema. `GeminiClient` talks to the
//! `generateContent` REST endpoint; tests substitute scripted fakes.
//!
//! No retries and no timeout policy live here beyond the client-level
//! timeout taken from configuration. A failure propagates immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::structurer::decode_json_value;

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("Assessment service not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("Assessment service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Assessment service returned no content")]
    EmptyResponse,

    #[error("Failed to decode assessment response: {0}")]
    Decode(String),
}

/// Request/response contract of the external model
#[async_trait]
pub trait AssessmentService: Send + Sync {
    /// Free-text completion
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String, AssessmentError>;

    /// Completion constrained to `schema`, decoded as JSON
    async fn complete_structured(
        &self,
        system_instruction: &str,
        user_text: &str,
        schema: &Value,
    ) -> Result<Value, AssessmentError>;
}

/// Configuration for the Gemini HTTP client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL, e.g. `https://generativelanguage.googleapis.com`
    pub base_url: String,
    /// Model name, e.g. `gemini-2.0-flash`
    pub model: String,
    /// API key; a missing key is reported on first call
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: Some(api_key.into()),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AssessmentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AssessmentError::NotConfigured(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn generate(&self, body: Value) -> Result<String, AssessmentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AssessmentError::NotConfigured("missing API key".to_string()))?;
        let endpoint = self.endpoint();
        debug!("POST {}", endpoint);

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| AssessmentError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssessmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AssessmentError::Decode(e.to_string()))?;
        extract_candidate_text(&value).ok_or(AssessmentError::EmptyResponse)
    }
}

#[async_trait]
impl AssessmentService for GeminiClient {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String, AssessmentError> {
        self.generate(request_body(system_instruction, user_text, None))
            .await
    }

    async fn complete_structured(
        &self,
        system_instruction: &str,
        user_text: &str,
        schema: &Value,
    ) -> Result<Value, AssessmentError> {
        let text = self
            .generate(request_body(system_instruction, user_text, Some(schema)))
            .await?;
        decode_json_value(&text).map_err(|e| AssessmentError::Decode(e.to_string()))
    }
}

fn request_body(system_instruction: &str, user_text: &str, schema: Option<&Value>) -> Value {
    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": user_text }] }],
    });
    if let Some(schema) = schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

/// Concatenated text parts of the first candidate
fn extract_candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
