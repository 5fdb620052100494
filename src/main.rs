//! # wikiqa CLI
//!
//! The `wikiqa` binary drives the pipeline end to end.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wikiqa init` | Create the SQLite database and run schema migrations |
//! | `wikiqa ingest` | Ingest the configured PDF export directory |
//! | `wikiqa ask "<question>"` | Answer a question with citations |
//! | `wikiqa stats` | Show index statistics |
//!
//! ## Examples
//!
//! ```bash
//! wikiqa init --config ./config/wikiqa.toml
//! wikiqa ingest --config ./config/wikiqa.toml
//! wikiqa ask "How do we roll back a deploy?" --config ./config/wikiqa.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use wikiqa::{ask, config, db, embedding, generate, ingest, migrate, sources, stats};

/// wikiqa — grounded question answering over wiki knowledge-base PDF
/// exports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/wikiqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "wikiqa",
    about = "Grounded question answering over wiki knowledge-base PDF exports",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wikiqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the configured document source.
    ///
    /// Scans the export directory, extracts and chunks each PDF, embeds
    /// the chunks, and upserts them into the vector index. Unreadable
    /// documents and failed embedding batches are skipped and reported;
    /// they never abort the run.
    Ingest,

    /// Ask a question against the indexed documents.
    Ask {
        /// The question to answer.
        query: String,
        /// Emit the response as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikiqa=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Ingest => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;

            let source: Arc<dyn sources::DocumentSource> =
                Arc::new(sources::FilesystemSource::new(&config.source)?);
            let embedder: Arc<dyn embedding::EmbeddingClient> =
                embedding::create_embedding_client(&config.embedding)?.into();

            let report = ingest::run_ingest(&config, &pool, source, embedder).await?;

            println!("ingest {}", config.source.root.display());
            println!("  documents found: {}", report.documents_found);
            println!(
                "  processed: {} ({} unchanged)",
                report.documents_processed, report.documents_unchanged
            );
            println!("  chunks indexed: {}", report.chunks_indexed);
            if report.chunks_skipped > 0 {
                println!("  chunks skipped: {}", report.chunks_skipped);
            }
            if !report.documents_skipped.is_empty() {
                println!("  skipped documents:");
                for skipped in &report.documents_skipped {
                    println!("    {} — {}", skipped.source_id, skipped.reason);
                }
            }
            println!("ok");

            pool.close().await;
        }

        Commands::Ask { query, json } => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;

            let embedder = embedding::create_embedding_client(&config.embedding)?;
            let generator = generate::create_generation_client(&config.generation)?;

            let response =
                ask::run_ask(&config, &pool, embedder.as_ref(), generator.as_ref(), &query)
                    .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer);
                if !response.citation_links.is_empty() {
                    println!();
                    println!("Sources:");
                    for link in &response.citation_links {
                        println!("  {}", link);
                    }
                }
                if !response.other_sources.is_empty() {
                    println!();
                    println!("Other sources:");
                    for name in &response.other_sources {
                        println!("  {}", name);
                    }
                }
            }

            pool.close().await;
        }

        Commands::Stats => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            stats::run_stats(&config, &pool).await?;
            pool.close().await;
        }
    }

    Ok(())
}
