//! # ragloom CLI
//!
//! Thin front over the library pipeline: every command parses arguments,
//! loads the TOML config, and calls a library entry point.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragloom init` | Create the SQLite database and run schema migrations |
//! | `ragloom ingest` | Load documents, chunk, embed, and store them |
//! | `ragloom query "<text>"` | Retrieve an adaptive, reranked context set |
//! | `ragloom stats` | Show index statistics |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragloom::config::load_config;
use ragloom::ingest::{ingest_documents, IngestOutcome};
use ragloom::models::RetrievalStatus;
use ragloom::retrieve::retrieve_context;
use ragloom::store::SqliteIndex;
use ragloom::{db, embedding, loader, migrate, query, rerank, stats};

/// ragloom — a layout-aware document ingestion and adaptive retrieval
/// pipeline.
#[derive(Parser)]
#[command(
    name = "ragloom",
    about = "A layout-aware document ingestion and adaptive retrieval pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ragloom.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest documents from the configured root: layout inference,
    /// chunking, late-chunking embedding, and storage.
    Ingest {
        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve an adaptively-sized, reranked context set for a query.
    Query {
        /// The query text.
        query: String,
    },

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Ingest { dry_run, limit } => {
            run_ingest(&config, dry_run, limit).await?;
        }

        Commands::Query { query } => {
            run_query(&config, &query).await?;
        }

        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    config: &ragloom::config::Config,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let mut docs = loader::load_documents(&config.ingest)?;
    if let Some(lim) = limit {
        docs.truncate(lim);
    }

    if dry_run {
        println!("ingest (dry-run)");
        println!("  documents found: {}", docs.len());
        let total_chunks: usize = docs
            .iter()
            .map(|(_, d)| {
                let mut d = d.clone();
                ragloom::layout::infer_layout(&mut d)
                    .map(|_| ragloom::chunk::chunk_document(&d, &config.chunking).len())
                    .unwrap_or(0)
            })
            .sum();
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is not configured. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let index = Arc::new(SqliteIndex::new(pool));

    let summary = ingest_documents(
        docs,
        &config.chunking,
        Arc::from(embedder),
        index.clone(),
        config.ingest.parallelism,
    )
    .await;

    println!("ingest");
    for report in &summary.reports {
        match &report.outcome {
            IngestOutcome::Ingested { chunks } => {
                println!("  ok      {} ({} chunks)", report.label, chunks)
            }
            IngestOutcome::SkippedUnchanged => {
                println!("  skip    {} (unchanged)", report.label)
            }
            IngestOutcome::Failed(reason) => {
                println!("  FAILED  {}: {}", report.label, reason)
            }
        }
    }
    println!(
        "  {} ingested, {} skipped, {} failed, {} chunks written",
        summary.ingested(),
        summary.skipped(),
        summary.failed(),
        summary.chunks_written()
    );

    index.pool().close().await;
    Ok(())
}

async fn run_query(config: &ragloom::config::Config, raw_query: &str) -> Result<()> {
    if raw_query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is not configured. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let adapter = query::QueryAdapter::new(&config.query);
    let scorer = rerank::create_scorer(&config.rerank, &config.completion)?;
    let pool = db::connect(config).await?;
    let index = SqliteIndex::new(pool);

    let (query, set) = retrieve_context(
        raw_query,
        &adapter,
        embedder.as_ref(),
        &index,
        &config.selection,
        scorer.as_deref(),
    )
    .await;

    match &set.status {
        RetrievalStatus::Complete => {}
        RetrievalStatus::Empty => println!("No results."),
        RetrievalStatus::Degraded(reason) => println!("Degraded retrieval: {}", reason),
    }

    if query.adapted != query.raw {
        println!("query: {:?} (adapted: {:?})", query.raw, query.adapted);
    }

    for (i, chunk) in set.chunks.iter().enumerate() {
        let rerank_display = chunk
            .rerank_score
            .map(|s| format!(" rerank {:.3}", s))
            .unwrap_or_default();
        println!(
            "{}. [{:.3}{}] doc {} #{}",
            i + 1,
            chunk.retrieval_score,
            rerank_display,
            &chunk.document_id[..12.min(chunk.document_id.len())],
            chunk.position
        );
        println!("    {}", chunk.text.replace('\n', " ").trim());
    }

    index.pool().close().await;
    Ok(())
}
