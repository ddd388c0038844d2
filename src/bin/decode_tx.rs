use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clmm_indexer::config::load_pool_configs;
use clmm_indexer::protocols::v2::default_registry;
use clmm_indexer::store::{SqliteStore, StoreError};
use clmm_indexer::{
    rpc, EventDecoder, IndexerConfig, InstructionDecoder, PoolSnapshot, RawTransaction,
    RecordBuilder, TxMeta,
};
use serde_json::json;

const USAGE: &str = "usage:
  decode_tx <signature> [--pools FILE] [--store POOL]
  decode_tx --backfill POOL [--limit N] [--pools FILE]";

struct Args {
    signature: Option<String>,
    pools: Option<PathBuf>,
    store_pool: Option<String>,
    backfill_pool: Option<String>,
    limit: usize,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        signature: None,
        pools: None,
        store_pool: None,
        backfill_pool: None,
        limit: 100,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().ok_or_else(|| anyhow!("{flag} needs a value"));
        match arg.as_str() {
            "--pools" => args.pools = Some(PathBuf::from(value("--pools")?)),
            "--store" => args.store_pool = Some(value("--store")?),
            "--backfill" => args.backfill_pool = Some(value("--backfill")?),
            "--limit" => {
                args.limit = value("--limit")?
                    .parse()
                    .context("--limit must be a number")?
            }
            other if other.starts_with("--") => return Err(anyhow!("unknown flag {other}")),
            other => args.signature = Some(other.to_string()),
        }
    }
    if args.signature.is_none() && args.backfill_pool.is_none() {
        return Err(anyhow!("missing signature"));
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            std::process::exit(1);
        }
    };
    let config = IndexerConfig::load(std::env::var_os("INDEXER_CONFIG").map(PathBuf::from).as_deref())?;

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .compact()
        .with_max_level(config.tracing_level())
        .init();

    let pool_path = args
        .pools
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.pool_config_path));
    let pools = PoolSnapshot::new(load_pool_configs(&pool_path)?);

    if let Some(pool) = &args.backfill_pool {
        return backfill(&config, pool, args.limit);
    }

    let signature = args
        .signature
        .as_deref()
        .ok_or_else(|| anyhow!("missing signature"))?;
    let tx = rpc::fetch_transaction(&config.rpc_url, signature)
        .with_context(|| format!("failed to fetch {signature}"))?;
    tracing::info!(slot = tx.slot, signature = %tx.signature, "fetched transaction");

    let summary = decode(&config, &pools, &tx);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(pool) = &args.store_pool {
        let mut store = SqliteStore::open(&config.database_path, config.shard_count)?;
        store.assign_pools([pool.as_str()])?;
        let id = store.insert_raw_transaction(pool, &tx)?;
        tracing::info!(pool = %pool, id, "stored raw transaction");
    }
    Ok(())
}

fn decode(config: &IndexerConfig, pools: &PoolSnapshot, tx: &RawTransaction) -> serde_json::Value {
    let v1 = InstructionDecoder::new(config.v1_program_id.clone());
    let v2 = EventDecoder::new(Arc::new(default_registry()));
    let builder = RecordBuilder::new(pools);
    let meta = TxMeta {
        tx_id: 0,
        signature: tx.signature.clone(),
        slot: tx.slot,
        block_time: tx.block_time,
    };

    let counts = v1.decode_transaction(tx, pools);
    let events = v2.decode_logs(&tx.log_messages);
    let records: Vec<_> = counts
        .iter()
        .filter_map(|count| builder.from_v1(count, &meta))
        .chain(events.iter().filter_map(|event| builder.from_v2(event, &meta)))
        .collect();

    json!({
        "signature": tx.signature,
        "slot": tx.slot,
        "blockTime": tx.block_time,
        "failed": tx.failed,
        "v1Counts": counts,
        "v2Events": events,
        "records": records,
    })
}

/// Stores the pool's recent transactions oldest first so row ids follow slot order.
/// Signatures older than the newest stored row are refused by the store.
fn backfill(config: &IndexerConfig, pool: &str, limit: usize) -> Result<()> {
    let mut store = SqliteStore::open(&config.database_path, config.shard_count)?;
    store.assign_pools([pool])?;

    let mut signatures = rpc::recent_signatures(&config.rpc_url, pool, limit)?;
    signatures.reverse();
    let mut stored = 0usize;
    let mut refused = 0usize;
    for signature in &signatures {
        let tx = match rpc::fetch_transaction(&config.rpc_url, signature) {
            Ok(tx) => tx,
            Err(err) => {
                tracing::warn!(signature = %signature, "skipping: {err:#}");
                continue;
            }
        };
        match store.insert_raw_transaction(pool, &tx) {
            Ok(_) => stored += 1,
            Err(err @ StoreError::OutOfOrder { .. }) => {
                refused += 1;
                tracing::warn!(signature = %signature, "not stored: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    if refused > 0 {
        tracing::warn!(pool, refused, "older signatures were refused; they are behind the stored history");
    }
    tracing::info!(pool, stored, requested = signatures.len(), "backfill complete");
    Ok(())
}
