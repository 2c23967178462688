//! safety-rag - retrieval engine for pre-work safety briefings
//!
//! # Usage
//!
//! ```bash
//! # Build the index from the configured sources
//! safety-rag ingest
//!
//! # Continue after an interrupted run / fill missing categories
//! safety-rag resume
//!
//! # Re-embed everything (e.g. after changing the embedding model)
//! safety-rag rebuild --force-full
//!
//! # Retrieve briefing material
//! safety-rag retrieve --equipment "170kV GIS" --tag electrical --work-type inspection
//! ```
//!
//! # Environment Variables
//!
//! - `SAFETY_RAG_CONFIG`: Path to the TOML config (default: ./rag_config.toml)
//! - `OPENAI_API_KEY` / `GEMINI_API_KEY`: Embedding provider credentials
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use safety_rag::config::RagConfig;
use safety_rag::embedding::{provider_from_config, EmbeddingClient};
use safety_rag::ingestion::{IngestError, IngestionPipeline, SourceCorpus};
use safety_rag::profile::ProfileCatalog;
use safety_rag::retrieval::SafetyRetriever;
use safety_rag::storage::{StorageLayout, StoreError, VectorStore};
use safety_rag::types::{Category, Equipment, IngestSummary, RiskFactor, WorkType};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "safety-rag")]
#[command(about = "Retrieval engine for pre-work safety briefings")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides SAFETY_RAG_CONFIG and ./rag_config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every corpus, resuming from a checkpoint if one exists
    Ingest,

    /// Embed only documents missing from incomplete categories
    Resume,

    /// Rebuild the index from the current sources
    Rebuild {
        /// Clear the index and re-embed everything
        #[arg(long)]
        force_full: bool,
    },

    /// Delete every document of one category from the index
    DeleteCategory {
        /// incident, education or regulation
        category: Category,
    },

    /// Retrieve briefing material for a piece of equipment and a work type
    Retrieve {
        #[arg(long)]
        equipment: String,

        /// Equipment tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Equipment risk tag (repeatable)
        #[arg(long = "risk")]
        risks: Vec<String>,

        #[arg(long)]
        work_type: String,

        /// Print the result as JSON instead of the briefing context text
        #[arg(long)]
        json: bool,
    },

    /// Show index counts, checkpoint and backup state
    Status,
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RagConfig> {
    match path {
        Some(p) => RagConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(RagConfig::load()),
    }
}

/// Open the index, or recreate it when a forced rebuild meets a dimension
/// change.
/// Open the index. With `accept_stored_dimension` an index built with
/// another embedding dimension is opened as it is; full rebuilds switch it
/// over and restore it untouched if they fail.
fn open_store(config: &RagConfig, layout: &StorageLayout, accept_stored_dimension: bool) -> Result<Arc<VectorStore>> {
    let dimension = config.embedding.dimension;
    match VectorStore::open(layout.index_dir(), dimension) {
        Ok(store) => Ok(Arc::new(store)),
        Err(StoreError::DimensionMismatch { expected, actual }) if accept_stored_dimension => {
            warn!(
                stored = expected,
                configured = actual,
                "Embedding dimension differs from the index"
            );
            let store = VectorStore::open(layout.index_dir(), expected).context("Failed to open vector index")?;
            Ok(Arc::new(store))
        }
        Err(e) => Err(e).context("Failed to open vector index"),
    }
}

fn embedder(config: &RagConfig) -> Result<EmbeddingClient> {
    let provider = provider_from_config(&config.embedding).context("Failed to create embedding provider")?;
    info!(provider = provider.name(), model = %config.embedding.model, "Embedding provider ready");
    Ok(EmbeddingClient::from_config(provider, &config.embedding))
}

fn load_corpus(config: &RagConfig) -> Result<SourceCorpus> {
    SourceCorpus::load(&config.sources, &config.ingestion).context("Failed to load sources")
}

fn pipeline(config: &RagConfig, layout: StorageLayout, store: Arc<VectorStore>) -> Result<IngestionPipeline> {
    Ok(IngestionPipeline::new(
        store,
        embedder(config)?,
        layout,
        config.ingestion.clone(),
        load_corpus(config)?,
    ))
}

/// Pipeline for operations that never embed, so no provider credentials
/// are needed
fn maintenance(config: &RagConfig, layout: StorageLayout, store: Arc<VectorStore>) -> Result<IngestionPipeline> {
    Ok(IngestionPipeline::maintenance(
        store,
        layout,
        config.ingestion.clone(),
        load_corpus(config)?,
    ))
}

fn report(summary: IngestSummary) {
    info!(
        processed = summary.processed,
        total = summary.total,
        remaining = summary.remaining,
        "Operation finished"
    );
    println!(
        "processed: {}  total: {}  remaining: {}",
        summary.processed, summary.total, summary.remaining
    );
}

fn ingest_result(result: Result<IngestSummary, IngestError>) -> Result<()> {
    match result {
        Ok(summary) => {
            report(summary);
            Ok(())
        }
        Err(IngestError::Cancelled {
            phase,
            last_completed_index,
        }) => {
            warn!(phase = %phase, ?last_completed_index, "Stopped by Ctrl+C; run `safety-rag resume` to continue");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!(error = %e, "Failed to read .env file");
        }
    }

    let config = load_config(args.config.as_ref())?;
    let layout = StorageLayout::new(&config.storage.base_path);
    layout.ensure_dirs().context("Failed to create storage directories")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, finishing current batch...");
        shutdown_token.cancel();
    });

    match args.command {
        Command::Ingest => {
            let store = open_store(&config, &layout, false)?;
            ingest_result(pipeline(&config, layout, store)?.ingest_all(&cancel_token).await)
        }
        Command::Resume => {
            let store = open_store(&config, &layout, false)?;
            ingest_result(pipeline(&config, layout, store)?.resume_incomplete(&cancel_token).await)
        }
        Command::Rebuild { force_full } => {
            let store = open_store(&config, &layout, force_full)?;
            ingest_result(pipeline(&config, layout, store)?.rebuild(force_full, &cancel_token).await)
        }
        Command::DeleteCategory { category } => {
            let store = open_store(&config, &layout, true)?;
            report(maintenance(&config, layout, store)?.delete_by_category(category)?);
            Ok(())
        }
        Command::Status => {
            let store = open_store(&config, &layout, true)?;
            let status = maintenance(&config, layout, store)?.status()?;
            for category in Category::ALL {
                println!(
                    "{category:<11} indexed: {:>6}  source: {:>6}",
                    status.indexed.get(&category).copied().unwrap_or(0),
                    status.source.get(&category).copied().unwrap_or(0),
                );
            }
            match &status.checkpoint {
                Some(cp) => println!(
                    "checkpoint: {} phase, next index {} of {} ({})",
                    cp.phase,
                    cp.resume_index(),
                    cp.total_count,
                    cp.timestamp
                ),
                None => println!("checkpoint: none"),
            }
            match &status.backup {
                Some(b) => println!("backup: {} records ({})", b.records, b.created_at),
                None => println!("backup: none"),
            }
            if status.recovered_from_corruption {
                println!("index was recreated after corruption; run `safety-rag ingest`");
            }
            Ok(())
        }
        Command::Retrieve {
            equipment,
            tags,
            risks,
            work_type,
            json,
        } => {
            let store = open_store(&config, &layout, false)?;
            let catalog = ProfileCatalog::load(config.profiles_path.as_deref())
                .context("Failed to load profile catalog")?;
            let retriever = SafetyRetriever::new(
                Arc::new(catalog),
                embedder(&config)?,
                store,
                &config.retrieval,
                &config.scoring,
            );

            let mut equipment = Equipment::new(equipment).with_tags(tags);
            for risk in risks {
                equipment = equipment.with_risk_factor(RiskFactor::new(risk));
            }
            let result = retriever.retrieve(&equipment, &WorkType::new(work_type)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("profile: {}\n", result.profile_id);
                println!("{}", result.render_context());
            }
            Ok(())
        }
    }
}
