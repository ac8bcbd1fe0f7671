//! Geocomply Server
//!
//! HTTP front end and CLI for the geo-compliance pipeline:
//!
//! - `serve` (default): REST API for analysis, status polling and CSV summaries
//! - `analyze`: run one analysis and print the result as JSON
//! - `merge-rules`: merge extracted YAML rule documents into a rules store
//!
//! ## Architecture
//!
//! Knowledge (terminology, aliases, rules, prompts) is loaded once at
//! startup; a load failure stops the process before it serves. Requests
//! share it read-only through `ComplianceEngine`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use compliance_engine::rules::RulesStore;
use compliance_engine::{ComplianceEngine, EngineConfig, GeminiClient, KnowledgeBase};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod store;

use api::{
    handle_analyze, handle_analyze_query, handle_get_analysis, handle_health,
    handle_list_analyses, handle_result, handle_summary,
};
use store::{AnalysisStore, InMemoryAnalysisStore, DEFAULT_CAPACITY};

/// Command-line arguments for the geocomply server
#[derive(Parser, Debug)]
#[command(name = "geocomply-server")]
#[command(about = "Geo-compliance analysis server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "PORT")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "10")]
    rate_limit: u32,

    /// Analyses kept in memory; the oldest are evicted first
    #[arg(long, default_value_t = DEFAULT_CAPACITY, env = "GEOCOMPLY_MAX_ANALYSES")]
    max_analyses: usize,

    /// Engine configuration file (TOML)
    #[arg(long, env = "GEOCOMPLY_CONFIG")]
    config: Option<PathBuf>,

    /// Terminology and region alias mapping (JSON or YAML)
    #[arg(long, env = "GEOCOMPLY_MAPPING")]
    mapping: Option<PathBuf>,

    /// Rules store (YAML or JSON)
    #[arg(long, env = "GEOCOMPLY_RULES")]
    rules: Option<PathBuf>,

    /// Prompt catalog (YAML)
    #[arg(long, env = "GEOCOMPLY_PROMPTS")]
    prompts: Option<PathBuf>,

    /// Assessment model name
    #[arg(long, env = "GEOCOMPLY_MODEL")]
    model: Option<String>,

    /// Assessment service base URL
    #[arg(long, env = "GEOCOMPLY_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve,

    /// Analyze one feature description and print the result as JSON
    Analyze {
        /// Feature description
        #[arg(long)]
        text: String,

        /// Jurisdiction hint, e.g. "US"
        #[arg(long)]
        jurisdiction: Option<String>,
    },

    /// Merge extracted YAML rule documents into a rules store
    MergeRules {
        /// Extracted documents, each with a `source.jurisdiction` key
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Rules store to write; merged into when it already exists
        #[arg(long)]
        output: PathBuf,
    },
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: ComplianceEngine,
    pub store: Arc<dyn AnalysisStore>,
}

/// API routes without rate limiting
pub fn build_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Analysis
        .route("/analyze", get(handle_analyze_query))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/analyses", get(handle_list_analyses))
        .route("/api/analyses/:id", get(handle_get_analysis))
        // Summaries
        .route("/api/result", get(handle_result))
        .route("/api/summary", get(handle_summary))
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &args.command {
        None | Some(Command::Serve) => serve(&args).await,
        Some(Command::Analyze { text, jurisdiction }) => {
            analyze_once(&args, text, jurisdiction.as_deref()).await
        }
        Some(Command::MergeRules { files, output }) => merge_rules(files, output),
    }
}

fn engine_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(path) = &args.mapping {
        config.knowledge.mapping_path = Some(path.clone());
    }
    if let Some(path) = &args.rules {
        config.knowledge.rules_path = Some(path.clone());
    }
    if let Some(path) = &args.prompts {
        config.knowledge.prompts_path = Some(path.clone());
    }
    if let Some(model) = &args.model {
        config.assessment.model = model.clone();
    }
    if let Some(base_url) = &args.api_base_url {
        config.assessment.base_url = base_url.clone();
    }
    Ok(config)
}

fn build_engine(config: &EngineConfig) -> anyhow::Result<ComplianceEngine> {
    let knowledge =
        KnowledgeBase::load(&config.knowledge).context("Failed to load knowledge base")?;
    let gemini = config.gemini_config();
    if gemini.api_key.is_none() {
        warn!(
            "{} is not set; assessment calls will fail",
            config.assessment.api_key_env
        );
    }
    let client = GeminiClient::new(gemini)?;
    info!("Assessment model: {}", client.model());
    Ok(ComplianceEngine::new(Arc::new(knowledge), Arc::new(client)))
}

async fn serve(args: &Args) -> anyhow::Result<()> {
    info!("Starting geocomply server on {}:{}", args.host, args.port);

    let config = engine_config(args)?;
    let engine = build_engine(&config)?;

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .context("Invalid rate limit configuration")?,
    );

    // Create shared state
    let state = AppState {
        engine,
        store: Arc::new(InMemoryAnalysisStore::with_capacity(args.max_analyses)),
    };

    let app = build_router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!("Keeping at most {} analyses", args.max_analyses);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn analyze_once(args: &Args, text: &str, jurisdiction: Option<&str>) -> anyhow::Result<()> {
    let config = engine_config(args)?;
    let engine = build_engine(&config)?;

    let response = engine.analyze(text, jurisdiction).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        anyhow::bail!("analysis failed");
    }
    Ok(())
}

fn merge_rules(files: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let mut rules = if output.exists() {
        RulesStore::load(output)?
    } else {
        RulesStore::default()
    };

    let mut merged = 0;
    for file in files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        match rules.merge_extracted(&text) {
            Ok(region) => {
                info!("{} -> {}", file.display(), region);
                merged += 1;
            }
            Err(err) => warn!("Skipping {}: {}", file.display(), err),
        }
    }

    rules
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Merged {} of {} documents into {} ({} regions)",
        merged,
        files.len(),
        output.display(),
        rules.region_count()
    );
    Ok(())
}
