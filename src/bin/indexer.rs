use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clmm_indexer::config::load_pool_configs;
use clmm_indexer::driver::{run_pool_loop, run_pool_refresh, PoolWorker, SharedContext, WorkerSettings};
use clmm_indexer::protocols::v2::default_registry;
use clmm_indexer::store::SqliteStore;
use clmm_indexer::{EventDecoder, IndexerConfig, InstructionDecoder, PoolRegistry, RollupEngine};
use tokio::sync::watch;

#[derive(Parser)]
#[command(author, version, about = "Index CLMM pools into multi-resolution klines", long_about = None)]
struct Cli {
    /// Path to the indexer JSON config
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the pool list path from the config
    #[arg(long)]
    pools: Option<PathBuf>,
    /// Run one cycle per pool and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = IndexerConfig::load(cli.config.as_deref())?;
    if let Some(pools) = cli.pools {
        config.pool_config_path = pools.to_string_lossy().into_owned();
    }

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .compact()
        .with_max_level(config.tracing_level())
        .init();

    let pool_path = PathBuf::from(&config.pool_config_path);
    let configured = load_pool_configs(&pool_path)?;
    let selected: Vec<String> = config
        .select_pools(&configured)
        .into_iter()
        .map(|pool| pool.address.clone())
        .collect();
    tracing::info!(
        configured = configured.len(),
        selected = selected.len(),
        "loaded pool configuration"
    );

    let mut store = SqliteStore::open(&config.database_path, config.shard_count)
        .with_context(|| format!("failed to open {}", config.database_path))?;
    store.assign_pools(selected.iter().map(String::as_str))?;
    let store = Arc::new(store);

    let ctx = SharedContext {
        registry: PoolRegistry::new(configured),
        v1: Arc::new(InstructionDecoder::new(config.v1_program_id.clone())),
        v2: Arc::new(EventDecoder::new(Arc::new(default_registry()))),
        engine: Arc::new(RollupEngine::new(Arc::new(config.usd_price_source()?))),
        store: store.clone(),
        source: store.clone(),
        settings: WorkerSettings::from_config(&config),
    };

    if cli.once {
        for pool in selected {
            let ctx = ctx.clone();
            let report = tokio::task::spawn_blocking(move || PoolWorker::new(pool, ctx).run_cycle())
                .await
                .context("worker task failed")?;
            println!("{}", serde_json::to_string(&report)?);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(selected.len() + 1);
    for pool in selected {
        let worker = PoolWorker::new(pool, ctx.clone());
        let ticker = tokio::time::interval(config.poll_interval());
        handles.push(tokio::spawn({
            let shutdown = shutdown_rx.clone();
            async move {
                let worker = run_pool_loop(worker, ticker, shutdown).await;
                if worker.stalls() > 0 {
                    tracing::warn!(pool = %worker.pool(), stalls = worker.stalls(), "pool worker stalled during run");
                }
            }
        }));
    }
    handles.push(tokio::spawn(run_pool_refresh(
        ctx.registry.clone(),
        pool_path,
        tokio::time::interval(config.pool_refresh_interval()),
        shutdown_rx,
    )));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    shutdown_tx.send(true).ok();

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!("task ended abnormally: {err}");
        }
    }
    Ok(())
}
