//! corkindex CLI: replay Cork event logs and inspect the reconstructed state.
//!
//! # Commands
//! ```text
//! corkindex replay --config <indexer.yaml> --events <events.jsonl> [--db <cork.db>] [--concurrent]
//! corkindex show   --db <cork.db> --kind <Kind> --id <id>
//! corkindex routes [--config <indexer.yaml>]
//! corkindex info
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use corkindex_core::{
    init_tracing, EntityKind, EntityStore, Indexer, IndexerConfig, LogConfig, MemoryStore,
    RawEvent, RunStats,
};
use corkindex_storage::SqliteStore;

#[derive(Parser)]
#[command(
    name = "corkindex",
    about = "Incremental state reconstruction for the Cork protocol",
    long_about = "
corkindex replays decoded Cork protocol events (one JSON object per line)
through the handler set and persists the resulting entities.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the configured log filter
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event file into a store
    Replay {
        /// Indexer configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,
        /// Events, one JSON object per line, in chain order
        #[arg(short, long)]
        events: PathBuf,
        /// SQLite database to write to (default: in-memory, discarded)
        #[arg(long)]
        db: Option<String>,
        /// Run one worker per chain instead of a single sequential pass
        #[arg(long)]
        concurrent: bool,
    },

    /// Print one stored entity as JSON
    Show {
        /// SQLite database written by `replay`
        #[arg(long)]
        db: String,
        /// Entity kind, e.g. Pool, Token, AccountToken
        #[arg(long)]
        kind: String,
        /// Entity id, e.g. 1:0xabc...
        #[arg(long)]
        id: String,
    },

    /// List the dispatch table and the statically subscribed contracts
    Routes {
        /// Indexer configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show build and backend info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            config,
            events,
            db,
            concurrent,
        } => cmd_replay(&config, &events, db.as_deref(), concurrent, cli.verbose).await,
        Commands::Show { db, kind, id } => cmd_show(&db, &kind, &id).await,
        Commands::Routes { config } => cmd_routes(config.as_deref()),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

// ─── replay ───────────────────────────────────────────────────────────────────

async fn cmd_replay(
    config_path: &Path,
    events_path: &Path,
    db: Option<&str>,
    concurrent: bool,
    verbose: bool,
) -> Result<()> {
    let mut config = IndexerConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if verbose {
        config.log.level = "debug".into();
    }
    init_tracing(&config.log);

    let table = corkindex_cork::compose_dispatch_table().context("building dispatch table")?;
    let indexer = match db {
        Some(path) => {
            let store = Arc::new(
                SqliteStore::open(path)
                    .await
                    .with_context(|| format!("opening {path}"))?,
            );
            Indexer::new(&config, table, store.clone()).with_checkpoints(store)
        }
        None => Indexer::new(&config, table, Arc::new(MemoryStore::new())),
    };

    indexer.resume().await.context("loading checkpoints")?;

    let events = read_events(events_path)?;
    info!(count = events.len(), indexer = indexer.id(), "replaying events");

    let stats = if concurrent {
        Arc::new(indexer).run(events).await?
    } else {
        indexer.replay(events).await?
    };
    print_stats(&stats);
    Ok(())
}

fn read_events(path: &Path) -> Result<Vec<RawEvent>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut events = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: RawEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), n + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn print_stats(stats: &RunStats) {
    println!("events      {}", stats.total());
    println!("  applied   {}", stats.applied);
    println!("  duplicate {}", stats.duplicates);
    println!("  unrouted  {}", stats.unrouted);
    println!("  skipped   {}", stats.skipped);
    println!("  failed    {}", stats.failed);
    println!("writes      {}", stats.writes);
}

// ─── show ─────────────────────────────────────────────────────────────────────

async fn cmd_show(db: &str, kind: &str, id: &str) -> Result<()> {
    let kind: EntityKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let store = SqliteStore::open(db)
        .await
        .with_context(|| format!("opening {db}"))?;

    let doc = store
        .get(kind, id)
        .await?
        .ok_or_else(|| anyhow!("{kind} {id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

// ─── routes ───────────────────────────────────────────────────────────────────

fn cmd_routes(config_path: Option<&Path>) -> Result<()> {
    let table = corkindex_cork::compose_dispatch_table()?;
    println!("{} routes", table.len());
    for (kind, event, handler) in table.routes() {
        println!("  {:<22} {event:<32} {handler}", kind.to_string());
    }

    if let Some(path) = config_path {
        let config = IndexerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        for chain in &config.chains {
            println!("\nchain {}", chain.chain_id);
            for c in &chain.contracts {
                println!("  {:<22} {} (from block {})", c.kind.to_string(), c.address, c.start_block);
            }
            for f in &chain.price_feeds {
                let to = f.to_token.as_deref().or(f.to_currency.as_deref()).unwrap_or("?");
                println!("  feed {} : {} -> {} ({} decimals)", f.aggregator, f.from_token, to, f.decimals);
            }
        }
    }
    Ok(())
}

// ─── info ─────────────────────────────────────────────────────────────────────

fn cmd_info() {
    let defaults = IndexerConfig::default();
    println!("corkindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default checkpoint interval: every {} blocks", defaults.checkpoint_interval);
    println!("  Default worker queue depth: {} events", defaults.channel_capacity);
    println!("  Default log level: {}", LogConfig::default().level);
    println!("  Storage backends: memory, SQLite, PostgreSQL (feature: postgres)");
    println!("  Entity kinds: {}", EntityKind::ALL.map(|k| k.as_str()).join(", "));
}
