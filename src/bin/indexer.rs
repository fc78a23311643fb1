//! # Blob Indexer CLI
//!
//! Serve the HTTP API, or run, resume and inspect indexing runs in the
//! foreground.

use anyhow::{Context, Result};
use blob_indexer::config::ConfigManager;
use blob_indexer::constants::operations;
use blob_indexer::logging::init_structured_logging;
use blob_indexer::orchestration::{IndexRequest, IndexingService, OrchestrationEngine};
use blob_indexer::registry::{ClientFactory, HandlerRegistry};
use blob_indexer::web::{self, AppState};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "blob-indexer")]
#[command(about = "Index a blob container into a vector search index")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind, overrides BIND_ADDRESS
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run a new indexing run to completion
    Run {
        /// Blob name prefix to enumerate (repeatable); all blobs when omitted
        #[arg(long = "prefix")]
        prefixes: Vec<String>,

        /// Target index, defaults to SEARCH_INDEX_NAME
        #[arg(long)]
        index: Option<String>,
    },

    /// Resume a halted run from its last checkpoint
    Resume {
        #[arg(long)]
        run_id: Uuid,
    },

    /// Print the checkpoint of a run
    Status {
        #[arg(long)]
        run_id: Uuid,
    },

    /// List stored runs with their status
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();
    let cli = Cli::parse();

    let settings = Arc::new(ConfigManager::load().context("loading configuration")?);
    let factory = ClientFactory::new(settings.clone());
    let engine = OrchestrationEngine::new(
        factory
            .build_collaborators()
            .context("building collaborators")?,
        factory
            .build_checkpoint_store()
            .await
            .context("opening checkpoint store")?,
        settings.clone(),
    );
    let service = Arc::new(IndexingService::new(engine));

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind_address.clone());
            let registry = Arc::new(HandlerRegistry::new(service));
            web::serve(&bind, AppState::new(registry))
                .await
                .context("serving HTTP API")?;
        }
        Commands::Run { prefixes, index } => {
            let run_id = Uuid::new_v4();
            info!(%run_id, "Starting run");
            eprintln!("run id: {run_id} (resume with `blob-indexer resume --run-id {run_id}`)");
            let summary = service
                .run_to_completion(run_id, IndexRequest::new(prefixes, index))
                .await
                .with_context(|| format!("indexing run {run_id} failed"))?;
            info!(%run_id, "Run finished");
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Resume { run_id } => {
            let summary = service
                .resume_to_completion(run_id)
                .await
                .with_context(|| format!("resuming run {run_id}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status { run_id } => {
            let registry = HandlerRegistry::new(service);
            let checkpoint = registry
                .invoke(operations::STATUS, json!({ "run_id": run_id }))
                .await
                .with_context(|| format!("reading status of run {run_id}"))?;
            println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        }
        Commands::List => {
            let registry = HandlerRegistry::new(service);
            let runs = registry
                .invoke(operations::LIST, serde_json::Value::Null)
                .await
                .context("listing runs")?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}
