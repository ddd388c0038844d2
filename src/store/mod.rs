//! Persistence seams. The rollup engine and driver see only these traits.

pub mod memory;
pub mod shard;
pub mod sqlite;

use thiserror::Error;

use crate::rollup::{BucketKey, KlineBucket, PoolTotals, Resolution};
use crate::types::{ProtocolVersion, StoredTransaction};

pub use memory::MemoryStore;
pub use shard::ShardMap;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt {table} row: {reason}")]
    Corrupt { table: &'static str, reason: String },
    #[error("pool {0} has no shard assignment")]
    UnassignedPool(String),
    #[error("pool {pool}: slot {slot} is older than stored slot {newest}")]
    OutOfOrder { pool: String, slot: u64, newest: u64 },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            reason: reason.into(),
        }
    }
}

/// Unit of atomic work. Dropping it without [`StoreTransaction::commit`] discards every write.
pub trait StoreTransaction {
    fn load_bucket(&mut self, key: &BucketKey) -> Result<Option<KlineBucket>, StoreError>;

    /// Buckets with `from <= bucket_start < to`, ascending.
    fn load_buckets_in_range(
        &mut self,
        pool: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<KlineBucket>, StoreError>;

    /// Latest bucket starting before `before` that carries an average.
    fn load_latest_before(
        &mut self,
        pool: &str,
        resolution: Resolution,
        before: i64,
    ) -> Result<Option<KlineBucket>, StoreError>;

    fn put_bucket(&mut self, bucket: &KlineBucket) -> Result<(), StoreError>;

    fn load_totals(&mut self, pool: &str) -> Result<Option<PoolTotals>, StoreError>;

    fn put_totals(&mut self, totals: &PoolTotals) -> Result<(), StoreError>;

    /// Never moves the cursor backward.
    fn advance_cursor(
        &mut self,
        pool: &str,
        version: ProtocolVersion,
        tx_id: u64,
    ) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Loads or creates the bucket at `key`, applies `merge` and writes it back.
    fn upsert_kline_bucket(
        &mut self,
        key: &BucketKey,
        merge: &mut dyn FnMut(&mut KlineBucket),
    ) -> Result<KlineBucket, StoreError> {
        let mut bucket = self
            .load_bucket(key)?
            .unwrap_or_else(|| KlineBucket::new(key));
        merge(&mut bucket);
        self.put_bucket(&bucket)?;
        Ok(bucket)
    }
}

pub trait KlineStore: Send + Sync {
    /// Last applied transaction id, `0` when the pool was never synced.
    fn read_cursor(&self, pool: &str, version: ProtocolVersion) -> Result<u64, StoreError>;

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

pub trait TransactionSource: Send + Sync {
    /// Up to `limit` transactions with `id > after`, ordered by `(slot, id)`.
    /// Writers keep ids in slot order per pool, so the order matches the id cursor.
    fn fetch_after(
        &self,
        pool: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError>;
}
