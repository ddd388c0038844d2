use std::sync::Arc;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::price::UsdPriceSource;
use crate::store::{StoreError, StoreTransaction};
use crate::types::{CanonicalRecord, PoolConfig};

use super::bucket::{BucketKey, KlineBucket, Observation, PoolTotals};
use super::resolution::Resolution;

#[derive(Debug, Error)]
pub enum RollupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("record for pool {record} applied to pool {pool}")]
    PoolMismatch { record: String, pool: String },
}

/// Folds canonical records into every resolution and into the pool totals.
/// All writes go through the caller's [`StoreTransaction`]; the caller commits.
pub struct RollupEngine {
    prices: Arc<dyn UsdPriceSource>,
}

impl RollupEngine {
    pub fn new(prices: Arc<dyn UsdPriceSource>) -> Self {
        Self { prices }
    }

    pub fn apply(
        &self,
        txn: &mut dyn StoreTransaction,
        pool: &PoolConfig,
        record: &CanonicalRecord,
    ) -> Result<(), RollupError> {
        if record.pool() != pool.address {
            return Err(RollupError::PoolMismatch {
                record: record.pool().to_string(),
                pool: pool.address.clone(),
            });
        }
        let obs = Observation::from_record(record, pool, self.prices.as_ref());

        for resolution in Resolution::all() {
            let key = BucketKey::containing(pool.address.as_str(), resolution, obs.block_time);
            let mut bucket = txn.upsert_kline_bucket(&key, &mut |b| b.merge(&obs))?;

            let average = match resolution.parent() {
                None => finest_average(txn, &bucket)?,
                Some(parent) => backfilled_average(txn, &bucket, parent)?,
            };
            if average != bucket.average {
                bucket.average = average;
                txn.put_bucket(&bucket)?;
            }
        }

        let mut totals = txn
            .load_totals(&pool.address)?
            .unwrap_or_else(|| PoolTotals::new(pool.address.as_str()));
        totals.merge(&obs);
        txn.put_totals(&totals)?;

        tracing::trace!(
            pool = %pool.address,
            tx_id = obs.tx_id,
            kind = record.kind_name(),
            "record rolled up"
        );
        Ok(())
    }
}

/// Running mean of the bucket's own prices, or the latest earlier average.
fn finest_average(
    txn: &mut dyn StoreTransaction,
    bucket: &KlineBucket,
) -> Result<Option<Decimal>, RollupError> {
    if bucket.price_count > 0 {
        return Ok(bucket.average);
    }
    let inherited = txn
        .load_latest_before(&bucket.pool, bucket.resolution, bucket.bucket_start)?
        .and_then(|earlier| earlier.average);
    Ok(inherited.or(bucket.average))
}

/// Mean over the parent slots from the span start up to the latest touched
/// parent bucket. Empty slots carry the nearest earlier value forward, seeded
/// from before the span when needed.
fn backfilled_average(
    txn: &mut dyn StoreTransaction,
    bucket: &KlineBucket,
    parent: Resolution,
) -> Result<Option<Decimal>, RollupError> {
    let start = bucket.bucket_start;
    let step = parent.duration_secs();
    let children =
        txn.load_buckets_in_range(&bucket.pool, parent, start, bucket.bucket_end())?;
    let Some(latest) = children.iter().map(|child| child.bucket_start).max() else {
        return Ok(bucket.average);
    };

    let by_start: FxHashMap<i64, Option<Decimal>> = children
        .iter()
        .map(|child| (child.bucket_start, child.average))
        .collect();
    let slots = ((latest - start) / step + 1).min(bucket.resolution.backfill_window());

    let mut carry = txn
        .load_latest_before(&bucket.pool, parent, start)?
        .and_then(|earlier| earlier.average);
    let mut sum = Decimal::ZERO;
    let mut count = 0u32;
    for slot in 0..slots {
        if let Some(Some(value)) = by_start.get(&(start + slot * step)) {
            carry = Some(*value);
        }
        if let Some(value) = carry {
            sum = sum.saturating_add(value);
            count += 1;
        }
    }

    if count == 0 {
        return Ok(bucket.average);
    }
    Ok(sum.checked_div(Decimal::from(count)).or(bucket.average))
}
