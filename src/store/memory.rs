use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::rollup::{BucketKey, KlineBucket, PoolTotals, Resolution};
use crate::types::{ProtocolVersion, StoredTransaction};

use super::{KlineStore, StoreError, StoreTransaction, TransactionSource};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<BucketKey, KlineBucket>,
    totals: FxHashMap<String, PoolTotals>,
    cursors: FxHashMap<(String, ProtocolVersion), u64>,
}

/// In-process store for tests and dry runs. Writes are staged on a copy and
/// swapped in on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    transactions: Mutex<Vec<StoredTransaction>>,
    fail_commits: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_transaction(&self, tx: StoredTransaction) {
        lock(&self.transactions).push(tx);
    }

    /// Makes every following commit fail until reset.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<KlineBucket> {
        lock(&self.state).buckets.get(key).cloned()
    }

    pub fn buckets(&self) -> Vec<KlineBucket> {
        lock(&self.state).buckets.values().cloned().collect()
    }

    pub fn totals(&self, pool: &str) -> Option<PoolTotals> {
        lock(&self.state).totals.get(pool).cloned()
    }
}

impl KlineStore for MemoryStore {
    fn read_cursor(&self, pool: &str, version: ProtocolVersion) -> Result<u64, StoreError> {
        Ok(lock(&self.state)
            .cursors
            .get(&(pool.to_string(), version))
            .copied()
            .unwrap_or(0))
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let guard = lock(&self.state);
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

impl TransactionSource for MemoryStore {
    fn fetch_after(
        &self,
        pool: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let mut page: Vec<StoredTransaction> = lock(&self.transactions)
            .iter()
            .filter(|tx| tx.pool == pool && tx.id > after)
            .cloned()
            .collect();
        page.sort_by_key(|tx| (tx.slot, tx.id));
        page.truncate(limit);
        Ok(page)
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, MemoryState>,
    staged: MemoryState,
    fail_commit: bool,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn load_bucket(&mut self, key: &BucketKey) -> Result<Option<KlineBucket>, StoreError> {
        Ok(self.staged.buckets.get(key).cloned())
    }

    fn load_buckets_in_range(
        &mut self,
        pool: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<KlineBucket>, StoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let range = BucketKey::new(pool, resolution, from)..BucketKey::new(pool, resolution, to);
        Ok(self
            .staged
            .buckets
            .range(range)
            .map(|(_, bucket)| bucket.clone())
            .collect())
    }

    fn load_latest_before(
        &mut self,
        pool: &str,
        resolution: Resolution,
        before: i64,
    ) -> Result<Option<KlineBucket>, StoreError> {
        let range =
            BucketKey::new(pool, resolution, i64::MIN)..BucketKey::new(pool, resolution, before);
        Ok(self
            .staged
            .buckets
            .range(range)
            .rev()
            .map(|(_, bucket)| bucket)
            .find(|bucket| bucket.average.is_some())
            .cloned())
    }

    fn put_bucket(&mut self, bucket: &KlineBucket) -> Result<(), StoreError> {
        self.staged.buckets.insert(bucket.key(), bucket.clone());
        Ok(())
    }

    fn load_totals(&mut self, pool: &str) -> Result<Option<PoolTotals>, StoreError> {
        Ok(self.staged.totals.get(pool).cloned())
    }

    fn put_totals(&mut self, totals: &PoolTotals) -> Result<(), StoreError> {
        self.staged
            .totals
            .insert(totals.pool.clone(), totals.clone());
        Ok(())
    }

    fn advance_cursor(
        &mut self,
        pool: &str,
        version: ProtocolVersion,
        tx_id: u64,
    ) -> Result<(), StoreError> {
        let cursor = self
            .staged
            .cursors
            .entry((pool.to_string(), version))
            .or_insert(0);
        *cursor = (*cursor).max(tx_id);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::unavailable("commit rejected"));
        }
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
