//! raidsync command line.
//!
//! Usage:
//!   # Interactive client: type console commands, ticks run in the background
//!   raidsync console --actor Arthas
//!
//!   # Reference bridge publishing a directory of event documents
//!   raidsync bridge --events ./events
//!
//!   # Print the import lines for one event document
//!   raidsync encode ./events/42.json --max-len 255

mod config;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

use raidsync_core::{SystemClock, chunk, codec};
use raidsync_engine::{BridgeAgent, Engine, SourceOfTruth, console};
use raidsync_storage::SqliteStorage;

use crate::config::CliConfig;
use crate::source::DirSource;

#[derive(Parser, Debug)]
#[command(name = "raidsync")]
#[command(about = "Offline raid signups synchronised through a local bridge")]
struct Args {
    /// Config file (defaults to ./raidsync.toml when present)
    #[arg(short, long, env = "RAIDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Shared database file, overriding the config
    #[arg(long, env = "RAIDSYNC_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the interactive client
    Console {
        /// Character name of the local user, overriding the config
        #[arg(long)]
        actor: Option<String>,
    },
    /// Drain the queue into a directory of event documents and publish them
    Bridge {
        /// Directory holding one `*.json` document per event
        #[arg(long)]
        events: PathBuf,

        /// Seconds between passes
        #[arg(long, default_value_t = 10)]
        interval: u64,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Print the import command lines for an event document
    Encode {
        document: PathBuf,

        /// Longest line the chat channel accepts
        #[arg(long)]
        max_len: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = CliConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        cfg.database = db;
    }

    // stdout carries console replies, logs go to stderr
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match args.command {
        Command::Console { actor } => {
            if let Some(actor) = actor {
                cfg.engine.local_actor = actor;
            }
            run_console(cfg).await
        }
        Command::Bridge {
            events,
            interval,
            once,
        } => run_bridge(cfg, events, interval, once).await,
        Command::Encode { document, max_len } => {
            let text = std::fs::read_to_string(&document)
                .with_context(|| format!("failed to read {}", document.display()))?;
            let snapshot = codec::parse_snapshot(&text)
                .with_context(|| format!("invalid event document {}", document.display()))?;
            let max_len = max_len.unwrap_or(cfg.engine.max_command_len);
            for line in chunk::render_import_commands(&snapshot, max_len)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

async fn run_console(cfg: CliConfig) -> Result<()> {
    let storage = SqliteStorage::open(&cfg.database)
        .with_context(|| format!("failed to open {}", cfg.database.display()))?;
    let tick_every = Duration::from_secs(cfg.engine.tick_interval_secs.max(1));
    let mut engine = Engine::new(cfg.engine, storage, Arc::new(SystemClock))?;
    tracing::info!(database = %cfg.database.display(), "console ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut ticker = tokio::time::interval(tick_every);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if matches!(line.trim(), "quit" | "exit") {
                    break;
                }
                let reply = console::handle_line(&mut engine, &line);
                stdout.write_all(format!("{reply}\n").as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = ticker.tick() => {
                match engine.tick() {
                    Ok(report) if report.changed => {
                        let count = engine.snapshots().map(|s| s.len()).unwrap_or(0);
                        stdout
                            .write_all(format!("Events updated from the bridge ({count} stored).\n").as_bytes())
                            .await?;
                        stdout.flush().await?;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "tick failed"),
                }
            }
        }
    }

    tracing::info!("console closed");
    Ok(())
}

async fn run_bridge(cfg: CliConfig, events: PathBuf, interval: u64, once: bool) -> Result<()> {
    let storage = SqliteStorage::open(&cfg.database)
        .with_context(|| format!("failed to open {}", cfg.database.display()))?;
    let mut bridge = BridgeAgent::new(storage, Arc::new(SystemClock));
    let mut source = DirSource::new(&events);
    tracing::info!(events = %events.display(), database = %cfg.database.display(), "bridge started");

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        ticker.tick().await;
        bridge_pass(&mut bridge, &mut source, once)?;
        if once {
            break;
        }
    }
    Ok(())
}

/// Runs one drain-and-publish pass. A failed pass is logged and retried on
/// the next interval; only a single `--once` run reports it as an error.
fn bridge_pass<S: SourceOfTruth + ?Sized>(
    bridge: &mut BridgeAgent,
    source: &mut S,
    once: bool,
) -> Result<()> {
    match bridge.sync_once(source) {
        Ok(report) => {
            tracing::debug!(?report, "bridge pass finished");
            Ok(())
        }
        Err(e) if once => Err(e).context("bridge pass failed"),
        Err(e) => {
            tracing::warn!(error = %e, "bridge pass failed, retrying next interval");
            Ok(())
        }
    }
}
