use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::rollup::{BucketKey, KlineBucket, PoolTotals, Resolution};
use crate::types::{ProtocolVersion, RawTransaction, StoredTransaction};

use super::shard::ShardMap;
use super::{KlineStore, StoreError, StoreTransaction, TransactionSource};

const SHARED_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sync_cursor (
    pool TEXT NOT NULL,
    version TEXT NOT NULL,
    tx_id INTEGER NOT NULL,
    PRIMARY KEY (pool, version)
);
CREATE TABLE IF NOT EXISTS pool_shard (
    pool TEXT PRIMARY KEY,
    shard INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS pool_totals (
    pool TEXT PRIMARY KEY,
    volume_a TEXT NOT NULL,
    volume_b TEXT NOT NULL,
    quote_volume TEXT NOT NULL,
    fee_a TEXT NOT NULL,
    fee_b TEXT NOT NULL,
    tx_count INTEGER NOT NULL,
    trade_count INTEGER NOT NULL,
    balance_a TEXT,
    balance_b TEXT,
    tvl_usd TEXT,
    last_block_time INTEGER NOT NULL,
    last_tx_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS raw_transaction (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pool TEXT NOT NULL,
    slot INTEGER NOT NULL,
    signature TEXT NOT NULL,
    block_time INTEGER NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE (pool, signature)
);
CREATE INDEX IF NOT EXISTS idx_raw_transaction_pool_slot ON raw_transaction (pool, slot, id);
";

const BUCKET_COLUMNS: &str = "pool, resolution, bucket_start, open, high, low, close, average, \
     price_sum, price_count, volume_a, volume_b, quote_volume, balance_a, balance_b, \
     usd_price_a, usd_price_b, tx_count, trade_count, max_block_time, last_tx_id";

fn bucket_schema(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            pool TEXT NOT NULL,
            resolution TEXT NOT NULL,
            bucket_start INTEGER NOT NULL,
            open TEXT,
            high TEXT,
            low TEXT,
            close TEXT,
            average TEXT,
            price_sum TEXT NOT NULL,
            price_count INTEGER NOT NULL,
            volume_a TEXT NOT NULL,
            volume_b TEXT NOT NULL,
            quote_volume TEXT NOT NULL,
            balance_a TEXT,
            balance_b TEXT,
            usd_price_a TEXT,
            usd_price_b TEXT,
            tx_count INTEGER NOT NULL,
            trade_count INTEGER NOT NULL,
            max_block_time INTEGER NOT NULL,
            last_tx_id INTEGER NOT NULL,
            PRIMARY KEY (pool, resolution, bucket_start)
        );"
    )
}

/// SQLite-backed store: one kline table per shard plus shared cursor,
/// totals and raw transaction tables.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    shards: ShardMap,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, shard_count: u16) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, shard_count)
    }

    pub fn open_in_memory(shard_count: u16) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, shard_count)
    }

    fn with_connection(conn: Connection, shard_count: u16) -> Result<Self, StoreError> {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SHARED_SCHEMA)?;
        let shard_count = shard_count.max(1);
        for shard in 0..shard_count {
            conn.execute_batch(&bucket_schema(&ShardMap::table_name(shard)))?;
        }

        let assignments = {
            let mut stmt = conn.prepare("SELECT pool, shard FROM pool_shard")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.map(|row| row.map(|(pool, shard)| (pool, shard as u16)))
                .collect::<Result<Vec<_>, _>>()?
        };
        let shards = ShardMap::new(shard_count, assignments);
        tracing::info!(
            shards = shard_count,
            assigned = shards.len(),
            "opened sqlite store"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            shards,
        })
    }

    /// Persists a shard for every pool that has none yet. Call before the
    /// store is shared.
    pub fn assign_pools<'a>(
        &mut self,
        pools: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<(String, u16)>, StoreError> {
        let added = self.shards.assign_missing(pools);
        if added.is_empty() {
            return Ok(added);
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for (pool, shard) in &added {
            tx.execute(
                "INSERT OR IGNORE INTO pool_shard (pool, shard) VALUES (?1, ?2)",
                params![pool, i64::from(*shard)],
            )?;
            tracing::info!(pool = %pool, shard, "assigned pool to shard");
        }
        tx.commit()?;
        Ok(added)
    }

    pub fn shard_map(&self) -> &ShardMap {
        &self.shards
    }

    /// Stores a fetched transaction for `pool`. Returns the row id, existing
    /// or new. A new row older than the pool's newest stored slot is refused
    /// with [`StoreError::OutOfOrder`]; row ids must follow slot order.
    pub fn insert_raw_transaction(
        &self,
        pool: &str,
        tx: &RawTransaction,
    ) -> Result<u64, StoreError> {
        let payload = serde_json::to_string(tx)?;
        let conn = self.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM raw_transaction WHERE pool = ?1 AND signature = ?2",
                params![pool, tx.signature],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id as u64);
        }

        let newest: Option<i64> = conn.query_row(
            "SELECT MAX(slot) FROM raw_transaction WHERE pool = ?1",
            params![pool],
            |row| row.get(0),
        )?;
        if let Some(newest) = newest.map(|slot| slot as u64) {
            if tx.slot < newest {
                return Err(StoreError::OutOfOrder {
                    pool: pool.to_string(),
                    slot: tx.slot,
                    newest,
                });
            }
        }

        conn.execute(
            "INSERT INTO raw_transaction (pool, slot, signature, block_time, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![pool, tx.slot as i64, tx.signature, tx.block_time, payload],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    pub fn bucket(&self, key: &BucketKey) -> Result<Option<KlineBucket>, StoreError> {
        let conn = self.lock();
        select_bucket(&conn, &self.shards, key)
    }

    pub fn totals(&self, pool: &str) -> Result<Option<PoolTotals>, StoreError> {
        let conn = self.lock();
        select_totals(&conn, pool)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KlineStore for SqliteStore {
    fn read_cursor(&self, pool: &str, version: ProtocolVersion) -> Result<u64, StoreError> {
        let conn = self.lock();
        let cursor: Option<i64> = conn
            .query_row(
                "SELECT tx_id FROM sync_cursor WHERE pool = ?1 AND version = ?2",
                params![pool, version.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor.map(|id| id as u64).unwrap_or(0))
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let conn = self.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            shards: &self.shards,
            finished: false,
        }))
    }
}

impl TransactionSource for SqliteStore {
    fn fetch_after(
        &self,
        pool: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, pool, slot, signature, block_time, payload
             FROM raw_transaction
             WHERE pool = ?1 AND id > ?2
             ORDER BY slot ASC, id ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![pool, after as i64, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, pool, slot, signature, block_time, payload)| {
                let tx: RawTransaction = serde_json::from_str(&payload)?;
                Ok(StoredTransaction {
                    id: id as u64,
                    pool,
                    slot: slot as u64,
                    signature,
                    block_time,
                    tx,
                })
            })
            .collect()
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    shards: &'a ShardMap,
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("rollback failed: {err}");
            }
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn load_bucket(&mut self, key: &BucketKey) -> Result<Option<KlineBucket>, StoreError> {
        select_bucket(&self.conn, self.shards, key)
    }

    fn load_buckets_in_range(
        &mut self,
        pool: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<KlineBucket>, StoreError> {
        let table = table_for(self.shards, pool)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BUCKET_COLUMNS} FROM {table}
             WHERE pool = ?1 AND resolution = ?2 AND bucket_start >= ?3 AND bucket_start < ?4
             ORDER BY bucket_start ASC"
        ))?;
        let buckets = stmt
            .query_map(params![pool, resolution.as_str(), from, to], bucket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    fn load_latest_before(
        &mut self,
        pool: &str,
        resolution: Resolution,
        before: i64,
    ) -> Result<Option<KlineBucket>, StoreError> {
        let table = table_for(self.shards, pool)?;
        let bucket = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BUCKET_COLUMNS} FROM {table}
                     WHERE pool = ?1 AND resolution = ?2 AND bucket_start < ?3
                       AND average IS NOT NULL
                     ORDER BY bucket_start DESC
                     LIMIT 1"
                ),
                params![pool, resolution.as_str(), before],
                bucket_from_row,
            )
            .optional()?;
        Ok(bucket)
    }

    fn put_bucket(&mut self, bucket: &KlineBucket) -> Result<(), StoreError> {
        let table = table_for(self.shards, &bucket.pool)?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} ({BUCKET_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21)"
            ),
            params![
                bucket.pool,
                bucket.resolution.as_str(),
                bucket.bucket_start,
                opt_text(bucket.open),
                opt_text(bucket.high),
                opt_text(bucket.low),
                opt_text(bucket.close),
                opt_text(bucket.average),
                bucket.price_sum.to_string(),
                bucket.price_count as i64,
                bucket.volume_a.to_string(),
                bucket.volume_b.to_string(),
                bucket.quote_volume.to_string(),
                opt_text(bucket.balance_a),
                opt_text(bucket.balance_b),
                opt_text(bucket.usd_price_a),
                opt_text(bucket.usd_price_b),
                bucket.tx_count as i64,
                bucket.trade_count as i64,
                bucket.max_block_time,
                bucket.last_tx_id as i64,
            ],
        )?;
        Ok(())
    }

    fn load_totals(&mut self, pool: &str) -> Result<Option<PoolTotals>, StoreError> {
        select_totals(&self.conn, pool)
    }

    fn put_totals(&mut self, totals: &PoolTotals) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pool_totals (
                pool, volume_a, volume_b, quote_volume, fee_a, fee_b, tx_count, trade_count,
                balance_a, balance_b, tvl_usd, last_block_time, last_tx_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                totals.pool,
                totals.volume_a.to_string(),
                totals.volume_b.to_string(),
                totals.quote_volume.to_string(),
                totals.fee_a.to_string(),
                totals.fee_b.to_string(),
                totals.tx_count as i64,
                totals.trade_count as i64,
                opt_text(totals.balance_a),
                opt_text(totals.balance_b),
                opt_text(totals.tvl_usd),
                totals.last_block_time,
                totals.last_tx_id as i64,
            ],
        )?;
        Ok(())
    }

    fn advance_cursor(
        &mut self,
        pool: &str,
        version: ProtocolVersion,
        tx_id: u64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sync_cursor (pool, version, tx_id) VALUES (?1, ?2, ?3)
             ON CONFLICT (pool, version) DO UPDATE SET tx_id = MAX(tx_id, excluded.tx_id)",
            params![pool, version.as_str(), tx_id as i64],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

fn table_for(shards: &ShardMap, pool: &str) -> Result<String, StoreError> {
    shards
        .shard_for(pool)
        .map(ShardMap::table_name)
        .ok_or_else(|| StoreError::UnassignedPool(pool.to_string()))
}

fn select_bucket(
    conn: &Connection,
    shards: &ShardMap,
    key: &BucketKey,
) -> Result<Option<KlineBucket>, StoreError> {
    let table = table_for(shards, &key.pool)?;
    let bucket = conn
        .query_row(
            &format!(
                "SELECT {BUCKET_COLUMNS} FROM {table}
                 WHERE pool = ?1 AND resolution = ?2 AND bucket_start = ?3"
            ),
            params![key.pool, key.resolution.as_str(), key.bucket_start],
            bucket_from_row,
        )
        .optional()?;
    Ok(bucket)
}

fn select_totals(conn: &Connection, pool: &str) -> Result<Option<PoolTotals>, StoreError> {
    let totals = conn
        .query_row(
            "SELECT pool, volume_a, volume_b, quote_volume, fee_a, fee_b, tx_count, trade_count,
                    balance_a, balance_b, tvl_usd, last_block_time, last_tx_id
             FROM pool_totals WHERE pool = ?1",
            params![pool],
            |row| {
                Ok(PoolTotals {
                    pool: row.get(0)?,
                    volume_a: decimal(row, 1)?,
                    volume_b: decimal(row, 2)?,
                    quote_volume: decimal(row, 3)?,
                    fee_a: decimal(row, 4)?,
                    fee_b: decimal(row, 5)?,
                    tx_count: row.get::<_, i64>(6)? as u64,
                    trade_count: row.get::<_, i64>(7)? as u64,
                    balance_a: opt_decimal(row, 8)?,
                    balance_b: opt_decimal(row, 9)?,
                    tvl_usd: opt_decimal(row, 10)?,
                    last_block_time: row.get(11)?,
                    last_tx_id: row.get::<_, i64>(12)? as u64,
                })
            },
        )
        .optional()?;
    Ok(totals)
}

fn bucket_from_row(row: &Row<'_>) -> rusqlite::Result<KlineBucket> {
    let resolution_name: String = row.get(1)?;
    let resolution = Resolution::from_str(&resolution_name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown resolution {resolution_name}").into(),
        )
    })?;
    Ok(KlineBucket {
        pool: row.get(0)?,
        resolution,
        bucket_start: row.get(2)?,
        open: opt_decimal(row, 3)?,
        high: opt_decimal(row, 4)?,
        low: opt_decimal(row, 5)?,
        close: opt_decimal(row, 6)?,
        average: opt_decimal(row, 7)?,
        price_sum: decimal(row, 8)?,
        price_count: row.get::<_, i64>(9)? as u64,
        volume_a: decimal(row, 10)?,
        volume_b: decimal(row, 11)?,
        quote_volume: decimal(row, 12)?,
        balance_a: opt_decimal(row, 13)?,
        balance_b: opt_decimal(row, 14)?,
        usd_price_a: opt_decimal(row, 15)?,
        usd_price_b: opt_decimal(row, 16)?,
        tx_count: row.get::<_, i64>(17)? as u64,
        trade_count: row.get::<_, i64>(18)? as u64,
        max_block_time: row.get(19)?,
        last_tx_id: row.get::<_, i64>(20)? as u64,
    })
}

fn opt_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn opt_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}
