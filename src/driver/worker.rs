use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::IndexerConfig;
use crate::core::error::{ErrorClass, IndexerError};
use crate::protocols::error::DecodeError;
use crate::core::pool_registry::{PoolLookup, PoolRegistry, PoolSnapshot};
use crate::protocols::v1::InstructionDecoder;
use crate::protocols::v2::EventDecoder;
use crate::records::RecordBuilder;
use crate::rollup::RollupEngine;
use crate::store::{KlineStore, TransactionSource};
use crate::types::{CanonicalRecord, PoolConfig, ProtocolVersion, StoredTransaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    pub page_size: usize,
    pub fetch_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            fetch_retries: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            fetch_retries: config.fetch_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Collaborators shared by every pool worker.
#[derive(Clone)]
pub struct SharedContext {
    pub registry: PoolRegistry,
    pub v1: Arc<InstructionDecoder>,
    pub v2: Arc<EventDecoder>,
    pub engine: Arc<RollupEngine>,
    pub store: Arc<dyn KlineStore>,
    pub source: Arc<dyn TransactionSource>,
    pub settings: WorkerSettings,
}

/// Outcome of one [`PoolWorker::run_cycle`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub pages: usize,
    pub applied: usize,
    pub records: usize,
    /// Applied transactions that carried protocol data but decoded to nothing.
    pub undecodable: usize,
    pub cursor: u64,
    pub stalled: bool,
    /// The page held a transaction whose id sorts after a later-slot row.
    pub out_of_order: bool,
    pub pool_missing: bool,
    pub error: Option<String>,
}

/// Result of applying one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOutcome {
    pub records: usize,
    pub undecodable: bool,
}

/// First row whose id exceeds a row after it, with that lower id.
/// Applying such a row would move the cursor past a transaction not yet seen.
fn find_inversion(page: &[StoredTransaction]) -> Option<(usize, u64)> {
    let mut lowest_after = vec![u64::MAX; page.len()];
    let mut lowest = u64::MAX;
    for (index, stored) in page.iter().enumerate().rev() {
        lowest_after[index] = lowest;
        lowest = lowest.min(stored.id);
    }
    page.iter()
        .zip(lowest_after)
        .enumerate()
        .find(|(_, (stored, lower))| stored.id > *lower)
        .map(|(index, (_, lower))| (index, lower))
}

/// Sequential indexer for a single pool.
#[derive(Clone)]
pub struct PoolWorker {
    pool: String,
    ctx: SharedContext,
    stalls: u64,
}

impl PoolWorker {
    pub fn new(pool: impl Into<String>, ctx: SharedContext) -> Self {
        Self {
            pool: pool.into(),
            ctx,
            stalls: 0,
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Cycles that ended on an unapplied transaction or aborted.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Counts a cycle that never returned a report.
    pub fn record_abort(&mut self) {
        self.stalls += 1;
    }

    /// Applies pages until one comes back empty or a transaction cannot be applied.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let pools = self.ctx.registry.snapshot();
        let Some(pool) = pools.lookup_pool_by_address(&self.pool).cloned() else {
            tracing::warn!(pool = %self.pool, "pool missing from configuration, skipping cycle");
            report.pool_missing = true;
            return report;
        };

        let mut cursor = match self.ctx.store.read_cursor(&pool.address, pool.version) {
            Ok(cursor) => cursor,
            Err(err) => {
                let err = IndexerError::Storage(err);
                tracing::warn!(pool = %pool.address, "reading cursor failed: {err}");
                report.error = Some(err.to_string());
                return report;
            }
        };
        report.cursor = cursor;

        loop {
            let page = match self.fetch_page(cursor) {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(pool = %pool.address, cursor, "giving up on fetch: {err}");
                    report.error = Some(err.to_string());
                    return report;
                }
            };
            if page.is_empty() {
                break;
            }
            report.pages += 1;

            let inversion = find_inversion(&page);
            for (index, stored) in page.iter().enumerate() {
                if stored.id <= cursor {
                    tracing::warn!(
                        pool = %pool.address,
                        tx_id = stored.id,
                        cursor,
                        "source returned an applied transaction"
                    );
                    continue;
                }
                let outcome = match inversion {
                    Some((at, lower_id)) if at == index => {
                        report.out_of_order = true;
                        Err(IndexerError::OutOfOrder {
                            tx_id: stored.id,
                            slot: stored.slot,
                            lower_id,
                        })
                    }
                    _ => self.process_transaction(stored, &pool, &pools),
                };
                match outcome {
                    Ok(outcome) => {
                        cursor = stored.id;
                        report.applied += 1;
                        report.records += outcome.records;
                        report.undecodable += usize::from(outcome.undecodable);
                    }
                    Err(err) => {
                        self.record_failure(&pool, stored, &err);
                        report.stalled = err.class() == ErrorClass::Fatal;
                        report.error = Some(err.to_string());
                        report.cursor = cursor;
                        return report;
                    }
                }
            }
        }

        report.cursor = cursor;
        if report.applied > 0 {
            tracing::info!(
                pool = %pool.address,
                applied = report.applied,
                records = report.records,
                cursor,
                "cycle complete"
            );
        }
        report
    }

    /// Decodes, rolls up and advances the cursor for one transaction in a
    /// single store transaction.
    pub fn process_transaction(
        &self,
        stored: &StoredTransaction,
        pool: &PoolConfig,
        pools: &PoolSnapshot,
    ) -> Result<TxOutcome, IndexerError> {
        let (records, decode_error) = self.decode(stored, pool, pools);
        let undecodable = match decode_error {
            Some(err) => {
                log_failure(pool, stored, &IndexerError::Decode(err));
                true
            }
            None => false,
        };

        let mut txn = self.ctx.store.begin().map_err(IndexerError::Storage)?;
        for record in &records {
            self.ctx
                .engine
                .apply(txn.as_mut(), pool, record)
                .map_err(|err| IndexerError::rollup(stored.id, err))?;
        }
        txn.advance_cursor(&pool.address, pool.version, stored.id)
            .map_err(|err| IndexerError::commit(stored.id, err))?;
        txn.commit()
            .map_err(|err| IndexerError::commit(stored.id, err))?;

        tracing::debug!(
            pool = %pool.address,
            tx_id = stored.id,
            signature = %stored.signature,
            records = records.len(),
            "transaction applied"
        );
        Ok(TxOutcome {
            records: records.len(),
            undecodable,
        })
    }

    /// Canonical records for this pool, in intra-transaction order. The first
    /// decode error is returned only when nothing decoded at all.
    pub fn decode(
        &self,
        stored: &StoredTransaction,
        pool: &PoolConfig,
        pools: &PoolSnapshot,
    ) -> (Vec<CanonicalRecord>, Option<DecodeError>) {
        if stored.tx.failed {
            tracing::debug!(signature = %stored.signature, "skipping failed transaction");
            return (Vec::new(), None);
        }
        let meta = stored.meta();
        let builder = RecordBuilder::new(pools);
        let (mut records, errors) = match pool.version {
            ProtocolVersion::V1 => {
                let (counts, errors) = self.ctx.v1.scan_transaction(&stored.tx, pools);
                let records: Vec<CanonicalRecord> = counts
                    .iter()
                    .filter_map(|count| builder.from_v1(count, &meta))
                    .collect();
                (records, errors)
            }
            ProtocolVersion::V2 => {
                let (events, errors) = self.ctx.v2.scan_logs(&stored.tx.log_messages);
                let records: Vec<CanonicalRecord> = events
                    .iter()
                    .filter_map(|event| builder.from_v2(event, &meta))
                    .collect();
                (records, errors)
            }
        };

        let decoded = records.len();
        records.retain(|record| record.pool() == pool.address);
        if records.len() != decoded {
            tracing::debug!(
                pool = %pool.address,
                tx_id = stored.id,
                dropped = decoded - records.len(),
                "dropped records for other pools"
            );
        }
        records.sort_by_key(|record| record.header().seq);
        let error = if decoded == 0 {
            errors.into_iter().next()
        } else {
            None
        };
        (records, error)
    }

    fn fetch_page(&self, cursor: u64) -> Result<Vec<StoredTransaction>, IndexerError> {
        let settings = self.ctx.settings;
        let mut attempt = 0u32;
        loop {
            match self
                .ctx
                .source
                .fetch_after(&self.pool, cursor, settings.page_size)
            {
                Ok(page) => return Ok(page),
                Err(err) if attempt < settings.fetch_retries => {
                    attempt += 1;
                    tracing::warn!(pool = %self.pool, attempt, "fetch failed, retrying: {err}");
                    std::thread::sleep(settings.retry_backoff * attempt);
                }
                Err(err) => return Err(IndexerError::Fetch(err)),
            }
        }
    }

    fn record_failure(&mut self, pool: &PoolConfig, stored: &StoredTransaction, err: &IndexerError) {
        if err.class() == ErrorClass::Fatal {
            self.stalls += 1;
        }
        log_failure(pool, stored, err);
    }
}

fn log_failure(pool: &PoolConfig, stored: &StoredTransaction, err: &IndexerError) {
    match err.class() {
        ErrorClass::Fatal => {
            tracing::error!(
                pool = %pool.address,
                tx_id = stored.id,
                signature = %stored.signature,
                "transaction rolled back, pool stalled: {err}"
            );
        }
        ErrorClass::Retryable => {
            tracing::warn!(
                pool = %pool.address,
                tx_id = stored.id,
                "storage unavailable, retrying next cycle: {err}"
            );
        }
        ErrorClass::Skippable => {
            tracing::warn!(
                pool = %pool.address,
                tx_id = stored.id,
                signature = %stored.signature,
                "skipping undecodable transaction: {err}"
            );
        }
    }
}
