// src/main.rs
// agent-memory CLI: store, search and ingest memories from the shell

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use agent_memory::cache::warming::{spawn_cache_maintenance, WarmingStrategy};
use agent_memory::config::{config_path, AppConfig};
use agent_memory::ingest::{FileIngestor, IngestOptions};
use agent_memory::logging;
use agent_memory::memory::{
    AddMemoryParams, EnhancedMemoryService, MemoryFilter, MemoryType, Metadata, SearchRequest,
    UpdateMemoryParams,
};
use agent_memory::query::QueryStrategy;

#[derive(Parser)]
#[command(name = "agent-memory")]
#[command(about = "Memory layer for agents: vector storage, cached search and file ingestion")]
#[command(version)]
struct Cli {
    /// Keep cache maintenance running in the background while the command runs
    #[arg(long, global = true)]
    maintain: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create collections and payload indexes
    Init,

    /// Store a memory
    Add {
        /// message, thought, document, task or memory_edit
        #[arg(short = 't', long = "type", default_value = "message")]
        memory_type: MemoryType,

        text: String,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Fetch a memory by id
    Get {
        #[arg(short = 't', long = "type")]
        memory_type: MemoryType,
        id: String,
    },

    /// Change a memory's text and/or metadata
    Update {
        #[arg(short = 't', long = "type")]
        memory_type: MemoryType,
        id: String,

        #[arg(long)]
        text: Option<String>,

        /// Metadata as a JSON object, merged into the existing metadata
        #[arg(short, long)]
        metadata: Option<String>,

        /// Replace metadata instead of merging
        #[arg(long)]
        replace: bool,
    },

    /// Delete a memory by id
    Delete {
        #[arg(short = 't', long = "type")]
        memory_type: MemoryType,
        id: String,
    },

    /// Semantic search across memory types
    Search {
        query: String,

        /// Restrict to these types (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<MemoryType>,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        min_score: Option<f32>,

        /// filter_only, high_speed, balanced, high_quality or hybrid
        #[arg(short, long)]
        strategy: Option<QueryStrategy>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        chat: Option<String>,

        /// Match memories carrying any of these tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,

        #[arg(long)]
        no_cache: bool,
    },

    /// Most recent memories of one type
    Recent {
        #[arg(short = 't', long = "type", default_value = "message")]
        memory_type: MemoryType,

        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        chat: Option<String>,
    },

    /// Ingest a file or directory as document memories
    Ingest {
        path: PathBuf,

        /// Walk subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Re-ingest content that is already stored
        #[arg(short, long)]
        force: bool,

        /// Metadata (JSON object) attached to every chunk
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Delete every chunk of an ingested file
    ForgetFile { file_id: String },

    /// Collection counts, cache and strategy statistics
    Stats,

    /// Re-run popular searches to refill the result cache
    Warm {
        /// frequent or recent
        #[arg(short, long, default_value = "frequent")]
        strategy: WarmingStrategy,

        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Print the effective configuration and validation results
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();
    logging::init(&config.logging);

    if let Commands::Config = cli.command {
        return show_config(&config);
    }

    let validation = config.validate();
    if !validation.is_valid() {
        bail!("invalid configuration:\n{}", validation.report());
    }

    let service = Arc::new(
        EnhancedMemoryService::connect(&config).context("failed to build memory service")?,
    );
    service
        .initialize()
        .await
        .context("failed to initialize collections")?;

    let maintenance = (cli.maintain && config.cache.enabled).then(|| {
        let interval = Duration::from_secs(config.cache.warming_interval_secs.max(1));
        info!("Cache maintenance every {}s", interval.as_secs());
        spawn_cache_maintenance(service.clone(), interval)
    });

    let result = run(cli.command, service, &config).await;

    if let Some(handle) = maintenance {
        handle.abort();
    }
    result
}

async fn run(command: Commands, service: Arc<EnhancedMemoryService>, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Init => {
            print_json(&service.stats().await?)?;
        }
        Commands::Add {
            memory_type,
            text,
            metadata,
        } => {
            let params = AddMemoryParams::new(memory_type, text).with_metadata(parse_metadata(metadata)?);
            print_json(&service.add_memory(params).await?)?;
        }
        Commands::Get { memory_type, id } => match service.get_memory(memory_type, &id).await? {
            Some(record) => print_json(&record)?,
            None => bail!("no {} memory with id {}", memory_type, id),
        },
        Commands::Update {
            memory_type,
            id,
            text,
            metadata,
            replace,
        } => {
            let params = UpdateMemoryParams {
                text,
                metadata: metadata.map(|m| parse_metadata(Some(m))).transpose()?,
                replace_metadata: replace,
            };
            print_json(&service.update_memory(memory_type, &id, params).await?)?;
        }
        Commands::Delete { memory_type, id } => {
            let deleted = service.delete_memory(memory_type, &id).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))?;
        }
        Commands::Search {
            query,
            types,
            limit,
            min_score,
            strategy,
            user,
            chat,
            tag,
            no_cache,
        } => {
            let mut filter = scope_filter(user, chat);
            for t in tag {
                filter = filter.tag(t);
            }
            let mut request = SearchRequest::new(query).with_types(types).with_filter(filter);
            request.limit = limit;
            request.min_score = min_score;
            request.strategy = strategy;
            request.use_cache = !no_cache;
            print_json(&service.search(&request).await?)?;
        }
        Commands::Recent {
            memory_type,
            limit,
            user,
            chat,
        } => {
            let records = service
                .get_recent(memory_type, &scope_filter(user, chat), limit)
                .await?;
            print_json(&records)?;
        }
        Commands::Ingest {
            path,
            recursive,
            force,
            metadata,
        } => {
            let ingestor = FileIngestor::new(service, config.ingest.clone())?;
            let options = IngestOptions {
                force,
                metadata: parse_metadata(metadata)?,
                strategy: None,
            };
            if path.is_dir() {
                print_json(&ingestor.ingest_dir(&path, recursive, &options).await?)?;
            } else {
                print_json(&ingestor.ingest_file(&path, &options).await?)?;
            }
        }
        Commands::ForgetFile { file_id } => {
            let ingestor = FileIngestor::new(service, config.ingest.clone())?;
            let deleted = ingestor.forget_file(&file_id).await?;
            print_json(&serde_json::json!({ "file_id": file_id, "deleted": deleted }))?;
        }
        Commands::Stats => {
            print_json(&service.stats().await?)?;
        }
        Commands::Warm { strategy, top_n } => {
            let top_n = top_n.unwrap_or(config.cache.warm_top_n);
            print_json(&service.warm_cache(strategy, top_n).await?)?;
        }
        Commands::Config => show_config(config)?,
    }
    Ok(())
}

fn show_config(config: &AppConfig) -> Result<()> {
    let validation = config.validate();
    let mut shown = config.clone();
    // Never echo secrets
    if shown.qdrant.api_key.is_some() {
        shown.qdrant.api_key = Some("***".to_string());
    }
    if shown.embedding.api_key.is_some() {
        shown.embedding.api_key = Some("***".to_string());
    }
    print_json(&serde_json::json!({
        "config_file": config_path(),
        "config": shown,
        "warnings": validation.warnings,
        "errors": validation.errors,
    }))
}

fn scope_filter(user: Option<String>, chat: Option<String>) -> MemoryFilter {
    let mut filter = MemoryFilter::new();
    if let Some(user) = user {
        filter = filter.user(user);
    }
    if let Some(chat) = chat {
        filter = filter.chat(chat);
    }
    filter
}

fn parse_metadata(raw: Option<String>) -> Result<Metadata> {
    match raw {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("metadata is not valid JSON")?;
            Ok(Metadata::try_from(value)?)
        }
        None => Ok(Metadata::new()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
