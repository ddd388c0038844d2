use std::path::PathBuf;

use tokio::sync::watch;
use tokio::time::Interval;

use crate::config::load_pool_configs;
use crate::core::pool_registry::PoolRegistry;

use super::worker::PoolWorker;

/// Runs `worker` on the blocking pool once per tick until shutdown is signalled.
/// A cycle that panics is logged and counted as a stall; the next tick starts
/// again from the committed cursor. Returns the worker once the loop ends.
pub async fn run_pool_loop(
    mut worker: PoolWorker,
    mut ticker: Interval,
    mut shutdown: watch::Receiver<bool>,
) -> PoolWorker {
    let pool = worker.pool().to_string();
    tracing::info!(pool = %pool, "pool worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let mut attempt = worker.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let report = attempt.run_cycle();
            (attempt, report)
        });
        match handle.await {
            Ok((returned, report)) => {
                worker = returned;
                if report.stalled {
                    tracing::warn!(pool = %pool, stalls = worker.stalls(), cursor = report.cursor, "pool stalled");
                }
            }
            Err(err) => {
                worker.record_abort();
                tracing::error!(pool = %pool, stalls = worker.stalls(), "pool cycle aborted: {err}");
            }
        }
    }

    tracing::info!(pool = %pool, "pool worker stopped");
    worker
}

/// Reloads the pool list from `path` every tick and swaps it into `registry`.
/// A failed reload keeps the previous snapshot.
pub async fn run_pool_refresh(
    registry: PoolRegistry,
    path: PathBuf,
    mut ticker: Interval,
    mut shutdown: watch::Receiver<bool>,
) {
    // The first tick fires immediately; the registry is already loaded.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let source = path.clone();
        match tokio::task::spawn_blocking(move || load_pool_configs(&source)).await {
            Ok(Ok(pools)) => {
                tracing::debug!(pools = pools.len(), "pool configuration refreshed");
                registry.replace(pools);
            }
            Ok(Err(err)) => {
                tracing::warn!("pool refresh failed, keeping previous snapshot: {err:#}");
            }
            Err(err) => {
                tracing::warn!("pool refresh task aborted: {err}");
            }
        }
    }
}
