use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::sync::watch;

use clmm_indexer::driver::{run_pool_loop, PoolWorker};
use clmm_indexer::protocols::v2::SwapEvent;
use clmm_indexer::rollup::BucketKey;
use clmm_indexer::store::{
    KlineStore, MemoryStore, SqliteStore, StoreError, StoreTransaction, TransactionSource,
};
use clmm_indexer::{ProtocolVersion, Resolution, StoredTransaction};

mod common;
use common::*;

const T: i64 = 1_700_092_800;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn minute(start: i64) -> BucketKey {
    BucketKey::new(V2_POOL, Resolution::Min1, start)
}

/// Swap of one token A at `milli_price / 1000` token B.
fn swap_at(milli_price: u64) -> Vec<u8> {
    swap_event_bytes(&v2_swap(1_000_000_000, milli_price * 1_000))
}

fn store_with(txs: Vec<StoredTransaction>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for tx in txs {
        store.push_transaction(tx);
    }
    store
}

#[test]
fn two_swaps_in_one_transaction_survive_replay() -> Result<()> {
    let tx = v2_transaction(42, 100, T + 5, &[swap_at(1_000), swap_at(1_020)]);
    let store = store_with(vec![tx.clone()]);
    let mut worker = v2_worker(store.clone())?;

    let report = worker.run_cycle();
    assert_eq!((report.applied, report.records, report.cursor), (1, 2, 42));
    assert!(!report.stalled);

    // the same row delivered again is below the cursor
    store.push_transaction(tx);
    for _ in 0..3 {
        let again = worker.run_cycle();
        assert_eq!(again.applied, 0);
        assert_eq!(again.cursor, 42);
    }

    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.open, Some(dec("1.00")));
    assert_eq!(bucket.close, Some(dec("1.02")));
    assert_eq!(bucket.high, Some(dec("1.02")));
    assert_eq!(bucket.low, Some(dec("1.00")));
    assert_eq!((bucket.tx_count, bucket.trade_count), (1, 2));
    assert_eq!(store.read_cursor(V2_POOL, ProtocolVersion::V2)?, 42);
    Ok(())
}

#[test]
fn rerunning_a_cycle_changes_nothing() -> Result<()> {
    let store = store_with(vec![
        v2_transaction(1, 10, T, &[swap_at(2_000)]),
        v2_transaction(2, 11, T + 61, &[swap_at(3_000)]),
        v2_transaction(3, 12, T + 122, &[swap_at(4_000)]),
    ]);
    let mut worker = v2_worker(store.clone())?;

    let first = worker.run_cycle();
    // page size is two
    assert_eq!((first.pages, first.applied, first.cursor), (2, 3, 3));
    let buckets = store.buckets();
    let totals = store.totals(V2_POOL);

    let second = worker.run_cycle();
    assert_eq!((second.pages, second.applied, second.cursor), (0, 0, 3));
    assert_eq!(store.buckets(), buckets);
    assert_eq!(store.totals(V2_POOL), totals);
    Ok(())
}

#[test]
fn sqlite_store_resumes_after_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("indexer.db");

    {
        let mut store = SqliteStore::open(&path, 2)?;
        store.assign_pools([V2_POOL])?;
        for (id, price) in [(1u64, 2_000u64), (2, 4_000)] {
            let stored = v2_transaction(id, 10 + id, T + id as i64, &[swap_at(price)]);
            store.insert_raw_transaction(V2_POOL, &stored.tx)?;
        }
        let mut worker = v2_worker(Arc::new(store))?;
        let report = worker.run_cycle();
        assert_eq!((report.applied, report.cursor), (2, 2));
    }

    let store = Arc::new(SqliteStore::open(&path, 2)?);
    assert_eq!(store.read_cursor(V2_POOL, ProtocolVersion::V2)?, 2);
    assert!(store.shard_map().shard_for(V2_POOL).is_some());

    let late = v2_transaction(3, 20, T + 30, &[swap_at(6_000)]);
    let id = store.insert_raw_transaction(V2_POOL, &late.tx)?;
    assert_eq!(id, 3);

    let mut worker = v2_worker(store.clone())?;
    let report = worker.run_cycle();
    assert_eq!((report.applied, report.cursor), (1, 3));

    let bucket = store.bucket(&minute(T))?.context("missing 1m bucket")?;
    assert_eq!(bucket.tx_count, 3);
    assert_eq!((bucket.open, bucket.close), (Some(dec("2")), Some(dec("6"))));
    assert_eq!(bucket.average, Some(dec("4")));
    Ok(())
}

#[test]
fn failed_commit_rolls_back_and_stalls() -> Result<()> {
    let store = store_with(vec![v2_transaction(1, 10, T, &[swap_at(2_000)])]);
    let mut worker = v2_worker(store.clone())?;

    store.set_fail_commits(true);
    let report = worker.run_cycle();
    assert!(report.stalled);
    assert_eq!((report.applied, report.cursor), (0, 0));
    assert!(report.error.is_some());
    assert_eq!(worker.stalls(), 1);
    assert!(store.buckets().is_empty());
    assert_eq!(store.totals(V2_POOL), None);
    assert_eq!(store.read_cursor(V2_POOL, ProtocolVersion::V2)?, 0);

    store.set_fail_commits(false);
    let report = worker.run_cycle();
    assert!(!report.stalled);
    assert_eq!((report.applied, report.cursor), (1, 1));
    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.tx_count, 1);
    Ok(())
}

#[test]
fn undecodable_and_failed_transactions_still_advance() -> Result<()> {
    let mut garbage = v2_transaction(1, 10, T, &[]);
    garbage.tx.log_messages.insert(1, "Program data: %%%".to_string());
    let mut failed = v2_transaction(2, 11, T + 1, &[swap_at(9_000)]);
    failed.tx.failed = true;
    let good = v2_transaction(3, 12, T + 2, &[swap_at(2_000)]);
    let store = store_with(vec![garbage, failed, good]);

    let report = v2_worker(store.clone())?.run_cycle();
    assert_eq!((report.applied, report.records, report.cursor), (3, 1, 3));
    assert_eq!(report.undecodable, 1);
    assert!(report.error.is_none());

    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.high, Some(dec("2")));
    assert_eq!(bucket.tx_count, 1);
    Ok(())
}

#[test]
fn lower_id_at_a_later_slot_stalls_instead_of_being_skipped() -> Result<()> {
    let store = store_with(vec![
        v2_transaction(1, 20, T + 20, &[swap_at(2_000)]),
        v2_transaction(2, 10, T + 10, &[swap_at(3_000)]),
    ]);
    let mut worker = v2_worker(store.clone())?;

    for _ in 0..2 {
        let report = worker.run_cycle();
        assert!(report.out_of_order);
        assert!(report.stalled);
        assert_eq!((report.applied, report.cursor), (0, 0));
        let error = report.error.context("inversion must be reported")?;
        assert!(error.contains("unapplied tx 1"), "{error}");
    }
    assert_eq!(worker.stalls(), 2);
    assert!(store.buckets().is_empty());
    assert_eq!(store.read_cursor(V2_POOL, ProtocolVersion::V2)?, 0);
    Ok(())
}

#[test]
fn rows_before_an_inversion_are_still_applied() -> Result<()> {
    let store = store_with(vec![
        v2_transaction(1, 5, T, &[swap_at(2_000)]),
        v2_transaction(3, 10, T + 10, &[swap_at(3_000)]),
        v2_transaction(2, 20, T + 20, &[swap_at(4_000)]),
    ]);
    let mut ctx = shared_context(store.clone(), load_pools()?);
    ctx.settings.page_size = 3;

    let report = PoolWorker::new(V2_POOL, ctx).run_cycle();
    assert!(report.out_of_order);
    assert_eq!((report.applied, report.cursor), (1, 1));
    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.tx_count, 1);
    assert_eq!(bucket.close, Some(dec("2")));
    Ok(())
}

#[test]
fn sqlite_refuses_backfill_older_than_stored_history() -> Result<()> {
    let mut store = SqliteStore::open_in_memory(2)?;
    store.assign_pools([V2_POOL])?;
    let newer = v2_transaction(1, 20, T + 20, &[swap_at(2_000)]);
    let older = v2_transaction(2, 10, T + 10, &[swap_at(3_000)]);
    store.insert_raw_transaction(V2_POOL, &newer.tx)?;

    let err = store
        .insert_raw_transaction(V2_POOL, &older.tx)
        .unwrap_err();
    assert!(matches!(err, StoreError::OutOfOrder { slot: 10, newest: 20, .. }));

    let report = v2_worker(Arc::new(store))?.run_cycle();
    assert!(!report.out_of_order);
    assert_eq!((report.applied, report.cursor), (1, 1));
    Ok(())
}

#[test]
fn records_for_other_pools_are_dropped() -> Result<()> {
    let foreign = SwapEvent {
        pool: V1_POOL.to_string(),
        ..v2_swap(1_000_000_000, 50_000_000)
    };
    let tx = v2_transaction(
        1,
        10,
        T,
        &[swap_event_bytes(&foreign), swap_at(2_000)],
    );
    let store = store_with(vec![tx]);

    let report = v2_worker(store.clone())?.run_cycle();
    assert_eq!((report.applied, report.records), (1, 1));
    assert!(store.totals(V1_POOL).is_none());
    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.high, Some(dec("2")));
    Ok(())
}

#[test]
fn unconfigured_pool_skips_the_cycle() -> Result<()> {
    let store = store_with(vec![v2_transaction(1, 10, T, &[swap_at(2_000)])]);
    let mut worker = PoolWorker::new(OWNER, shared_context(store.clone(), load_pools()?));

    let report = worker.run_cycle();
    assert!(report.pool_missing);
    assert_eq!(report.applied, 0);
    assert!(store.buckets().is_empty());
    Ok(())
}

/// Fails the first `failures` fetches, then delegates.
struct FlakySource {
    inner: MemoryStore,
    failures: AtomicU32,
}

impl KlineStore for FlakySource {
    fn read_cursor(&self, pool: &str, version: ProtocolVersion) -> Result<u64, StoreError> {
        self.inner.read_cursor(pool, version)
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        self.inner.begin()
    }
}

impl TransactionSource for FlakySource {
    fn fetch_after(
        &self,
        pool: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::unavailable("connection reset"));
        }
        self.inner.fetch_after(pool, after, limit)
    }
}

fn flaky(failures: u32) -> Arc<FlakySource> {
    let inner = MemoryStore::new();
    inner.push_transaction(v2_transaction(1, 10, T, &[swap_at(2_000)]));
    Arc::new(FlakySource {
        inner,
        failures: AtomicU32::new(failures),
    })
}

#[test]
fn fetch_retries_ride_out_transient_errors() -> Result<()> {
    let source = flaky(2);
    let mut ctx = shared_context(source.clone(), load_pools()?);
    ctx.settings.fetch_retries = 2;

    let report = PoolWorker::new(V2_POOL, ctx).run_cycle();
    assert!(report.error.is_none());
    assert_eq!((report.applied, report.cursor), (1, 1));
    Ok(())
}

#[test]
fn exhausted_retries_leave_the_cursor() -> Result<()> {
    let source = flaky(5);
    let mut ctx = shared_context(source.clone(), load_pools()?);
    ctx.settings.fetch_retries = 1;
    let mut worker = PoolWorker::new(V2_POOL, ctx);

    let report = worker.run_cycle();
    assert!(report.error.is_some());
    assert!(!report.stalled);
    assert_eq!(worker.stalls(), 0);
    assert_eq!(source.read_cursor(V2_POOL, ProtocolVersion::V2)?, 0);
    Ok(())
}

#[tokio::test]
async fn pool_loop_indexes_until_shutdown() -> Result<()> {
    let store = store_with(vec![v2_transaction(1, 10, T, &[swap_at(2_000)])]);
    let worker = v2_worker(store.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_pool_loop(
        worker,
        tokio::time::interval(Duration::from_millis(5)),
        shutdown_rx,
    ));

    for _ in 0..400 {
        if store.read_cursor(V2_POOL, ProtocolVersion::V2)? == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    store.push_transaction(v2_transaction(2, 11, T + 3, &[swap_at(3_000)]));
    for _ in 0..400 {
        if store.read_cursor(V2_POOL, ProtocolVersion::V2)? == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    shutdown_tx.send(true)?;
    let worker = handle.await?;
    assert_eq!(worker.stalls(), 0);
    assert_eq!(store.read_cursor(V2_POOL, ProtocolVersion::V2)?, 2);
    let bucket = store.bucket(&minute(T)).context("missing 1m bucket")?;
    assert_eq!(bucket.close, Some(dec("3")));
    Ok(())
}
