//! Incident feed sync: binary entrypoint.
//! Imports a feed location once, or on a fixed interval, into the configured store.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incident_feed_sync::feed::sources::LocationSource;
use incident_feed_sync::feed::types::FeedSource;
use incident_feed_sync::store::PersistenceGateway;
use incident_feed_sync::{scheduler, MemoryStore, ReconciliationEngine, SqliteStore, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "incident-feed-sync", version, about)]
struct Cli {
    /// Feed URL (http/https) or a file / directory of feed snapshots.
    location: String,

    /// Repeat every N seconds instead of running once.
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Store location; `memory` for a throwaway in-memory store.
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// TOML config file (defaults to $SYNC_CONFIG_PATH or config/sync.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("incident_feed_sync=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Local .env is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut cfg = SyncConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }
    if let Some(secs) = cli.interval {
        cfg.interval_secs = Some(secs);
    }
    cfg.validate()?;

    let source: Arc<dyn FeedSource> =
        Arc::new(LocationSource::parse(&cli.location, cfg.http_timeout())?);
    tracing::info!(location = %cli.location, source = source.name(), "importing");

    if cfg.uses_memory_store() {
        run(MemoryStore::new(), &cfg, source).await
    } else {
        let store = SqliteStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("opening store {}", cfg.database_url))?;
        run(store, &cfg, source).await
    }
}

async fn run<S>(store: S, cfg: &SyncConfig, source: Arc<dyn FeedSource>) -> Result<()>
where
    S: PersistenceGateway + 'static,
{
    let engine = ReconciliationEngine::from_config(store, cfg)?;

    match cfg.interval() {
        None => {
            let report = scheduler::run_once(source.as_ref(), &engine).await?;
            let imported: usize = report
                .batches
                .iter()
                .map(|(_, s)| s.reports_inserted)
                .sum();
            tracing::info!(
                batches = report.batches.len(),
                undecodable = report.undecodable.len(),
                reports_inserted = imported,
                "import finished"
            );
            Ok(())
        }
        Some(every) => {
            let handle = scheduler::spawn_scheduler(every, source, Arc::new(engine));
            tokio::select! {
                res = handle => res.context("scheduler task ended")?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
            Ok(())
        }
    }
}
