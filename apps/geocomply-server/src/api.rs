//! API handlers for the geocomply server
//!
//! Provides REST endpoints for:
//! - Feature analysis (JSON body or query string)
//! - Analysis status lookup
//! - Summary rows as JSON or a CSV download

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shared_types::{AnalysisResponse, ComplianceRecord, SummaryRow};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::store::AnalysisEntry;
use crate::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub regions: usize,
    pub terms: usize,
}

/// Handler: GET /health
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let knowledge = state.engine.knowledge();
    Json(HealthResponse {
        status: "healthy",
        service: "geocomply-server",
        version: env!("CARGO_PKG_VERSION"),
        regions: knowledge.rules.region_count(),
        terms: knowledge.terminology.len(),
    })
}

/// Analyze request, as JSON body or query string
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Feature description
    #[serde(default)]
    pub text: String,

    /// Optional jurisdiction hint, e.g. "US"
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

/// Analysis outcome with the id it is stored under
#[derive(Debug, Serialize)]
pub struct AnalyzeApiResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub response: AnalysisResponse,
}

/// Handler: POST /api/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeApiResponse>, ServerError> {
    run_analysis(&state, request).await.map(Json)
}

/// Handler: GET /analyze?text=...&jurisdiction=...
pub async fn handle_analyze_query(
    State(state): State<AppState>,
    Query(request): Query<AnalyzeRequest>,
) -> Result<Json<AnalyzeApiResponse>, ServerError> {
    run_analysis(&state, request).await.map(Json)
}

async fn run_analysis(
    state: &AppState,
    request: AnalyzeRequest,
) -> Result<AnalyzeApiResponse, ServerError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ServerError::InvalidRequest(
            "text must not be empty".to_string(),
        ));
    }
    let jurisdiction = request
        .jurisdiction
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty());

    let entry = state.store.create(text, jurisdiction).await;
    info!("Analysis {} queued", entry.id);
    state.store.mark_running(entry.id).await;

    let response = state.engine.analyze(text, jurisdiction).await;
    let finished = state.store.finish(entry.id, response.clone()).await;
    debug!(
        "Analysis {} finished as {:?}",
        entry.id,
        finished.map(|e| e.status)
    );

    Ok(AnalyzeApiResponse {
        id: entry.id,
        response,
    })
}

/// Analysis list response
#[derive(Serialize)]
pub struct AnalysisListResponse {
    pub success: bool,
    pub analyses: Vec<AnalysisEntry>,
    pub count: usize,
}

/// Handler: GET /api/analyses
pub async fn handle_list_analyses(State(state): State<AppState>) -> Json<AnalysisListResponse> {
    let analyses = state.store.list().await;
    let count = analyses.len();
    Json(AnalysisListResponse {
        success: true,
        analyses,
        count,
    })
}

/// Handler: GET /api/analyses/:id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisEntry>, ServerError> {
    let id = parse_analysis_id(&id)?;
    state
        .store
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(id.to_string()))
}

pub fn parse_analysis_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServerError::InvalidRequest(format!("'{}' is not a valid analysis id", raw)))
}

/// Records sent to the summarizer when no `limit` is given
pub const DEFAULT_SUMMARY_LIMIT: usize = 50;

/// Upper bound on `limit`
pub const MAX_SUMMARY_LIMIT: usize = 200;

/// Window over the most recent completed analyses
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub limit: Option<usize>,
}

impl SummaryQuery {
    fn limit(&self) -> Result<usize, ServerError> {
        match self.limit {
            Some(0) => Err(ServerError::InvalidRequest(
                "limit must be at least 1".to_string(),
            )),
            Some(limit) => Ok(limit.min(MAX_SUMMARY_LIMIT)),
            None => Ok(DEFAULT_SUMMARY_LIMIT),
        }
    }
}

/// Summary rows response
#[derive(Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub rows: Vec<SummaryRow>,
    pub count: usize,
}

/// Handler: GET /api/result?limit=...
pub async fn handle_result(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, ServerError> {
    let records = completed_records(&state, query.limit()?).await;
    let rows = state.engine.summarize(&records).await?;
    let count = rows.len();
    Ok(Json(SummaryResponse {
        success: true,
        rows,
        count,
    }))
}

/// Handler: GET /api/summary?limit=...
pub async fn handle_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let records = completed_records(&state, query.limit()?).await;
    let csv = state.engine.summarize_csv(&records).await?;
    info!("Summary CSV for {} records", records.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"summary.csv\"",
            ),
        ],
        csv,
    ))
}

/// The `limit` most recent completed records, oldest first
async fn completed_records(state: &AppState, limit: usize) -> Vec<ComplianceRecord> {
    let entries = state.store.list().await;
    let mut records: Vec<ComplianceRecord> = entries
        .iter()
        .rev()
        .filter_map(AnalysisEntry::record)
        .take(limit)
        .cloned()
        .collect();
    records.reverse();
    records
}
