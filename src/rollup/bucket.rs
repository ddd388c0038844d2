use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::price::UsdPriceSource;
use crate::types::{CanonicalRecord, PoolConfig};

use super::resolution::Resolution;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketKey {
    pub pool: String,
    pub resolution: Resolution,
    pub bucket_start: i64,
}

impl BucketKey {
    pub fn new(pool: impl Into<String>, resolution: Resolution, bucket_start: i64) -> Self {
        Self {
            pool: pool.into(),
            resolution,
            bucket_start,
        }
    }

    pub fn containing(pool: impl Into<String>, resolution: Resolution, timestamp: i64) -> Self {
        Self::new(pool, resolution, resolution.bucket_start(timestamp))
    }
}

/// What one canonical record contributes to a bucket and to the pool totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    pub tx_id: u64,
    pub block_time: i64,
    pub price: Option<Decimal>,
    pub is_trade: bool,
    pub volume_a: Decimal,
    pub volume_b: Decimal,
    pub quote_volume: Decimal,
    pub fee_a: Decimal,
    pub fee_b: Decimal,
    pub balance_a: Option<Decimal>,
    pub balance_b: Option<Decimal>,
    pub usd_price_a: Option<Decimal>,
    pub usd_price_b: Option<Decimal>,
}

impl Observation {
    /// Quote volume is priced from token B when its USD price is known, otherwise token A.
    pub fn from_record(
        record: &CanonicalRecord,
        pool: &PoolConfig,
        prices: &dyn UsdPriceSource,
    ) -> Self {
        let (volume_a, volume_b) = record.volumes();
        let (fee_a, fee_b) = record.fees();
        let (balance_a, balance_b) = record.balances();
        let usd_price_a = prices.usd_price(&pool.token_a_mint);
        let usd_price_b = prices.usd_price(&pool.token_b_mint);

        let quote_volume = match (usd_price_b, usd_price_a) {
            (Some(usd_b), _) => volume_b.saturating_mul(usd_b),
            (None, Some(usd_a)) => volume_a.saturating_mul(usd_a),
            (None, None) => Decimal::ZERO,
        };

        Self {
            tx_id: record.tx_id(),
            block_time: record.block_time(),
            price: record.price(),
            is_trade: matches!(record, CanonicalRecord::Swap(_)),
            volume_a,
            volume_b,
            quote_volume,
            fee_a,
            fee_b,
            balance_a,
            balance_b,
            usd_price_a,
            usd_price_b,
        }
    }
}

/// One OHLC bar. Price fields stay `None` until the first priced observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineBucket {
    pub pool: String,
    pub resolution: Resolution,
    pub bucket_start: i64,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub average: Option<Decimal>,
    pub price_sum: Decimal,
    pub price_count: u64,
    pub volume_a: Decimal,
    pub volume_b: Decimal,
    pub quote_volume: Decimal,
    pub balance_a: Option<Decimal>,
    pub balance_b: Option<Decimal>,
    pub usd_price_a: Option<Decimal>,
    pub usd_price_b: Option<Decimal>,
    pub tx_count: u64,
    pub trade_count: u64,
    pub max_block_time: i64,
    /// Last transaction counted into `tx_count`.
    pub last_tx_id: u64,
}

impl KlineBucket {
    pub fn new(key: &BucketKey) -> Self {
        Self {
            pool: key.pool.clone(),
            resolution: key.resolution,
            bucket_start: key.bucket_start,
            open: None,
            high: None,
            low: None,
            close: None,
            average: None,
            price_sum: Decimal::ZERO,
            price_count: 0,
            volume_a: Decimal::ZERO,
            volume_b: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            balance_a: None,
            balance_b: None,
            usd_price_a: None,
            usd_price_b: None,
            tx_count: 0,
            trade_count: 0,
            max_block_time: i64::MIN,
            last_tx_id: 0,
        }
    }

    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.pool.clone(), self.resolution, self.bucket_start)
    }

    pub fn bucket_end(&self) -> i64 {
        self.bucket_start + self.resolution.duration_secs()
    }

    pub fn has_price(&self) -> bool {
        self.close.is_some()
    }

    /// Folds one observation in. The running mean of prices becomes the
    /// average; coarser resolutions overwrite it afterwards.
    pub fn merge(&mut self, obs: &Observation) {
        if let Some(price) = obs.price {
            match (self.open, self.high, self.low) {
                (Some(_), Some(high), Some(low)) => {
                    self.high = Some(high.max(price));
                    self.low = Some(low.min(price));
                }
                _ => {
                    self.open = Some(price);
                    self.high = Some(price);
                    self.low = Some(price);
                }
            }
            self.close = Some(price);
            self.price_sum = self.price_sum.saturating_add(price);
            self.price_count += 1;
            self.average = self
                .price_sum
                .checked_div(Decimal::from(self.price_count))
                .or(self.average);
        }

        self.volume_a = self.volume_a.saturating_add(obs.volume_a);
        self.volume_b = self.volume_b.saturating_add(obs.volume_b);
        self.quote_volume = self.quote_volume.saturating_add(obs.quote_volume);
        if obs.tx_id != self.last_tx_id {
            self.tx_count += 1;
            self.last_tx_id = obs.tx_id;
        }
        if obs.is_trade {
            self.trade_count += 1;
        }

        if obs.block_time >= self.max_block_time {
            self.balance_a = obs.balance_a.or(self.balance_a);
            self.balance_b = obs.balance_b.or(self.balance_b);
            self.usd_price_a = obs.usd_price_a.or(self.usd_price_a);
            self.usd_price_b = obs.usd_price_b.or(self.usd_price_b);
            self.max_block_time = obs.block_time;
        }
    }
}

/// Per-pool running totals maintained next to the buckets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTotals {
    pub pool: String,
    pub volume_a: Decimal,
    pub volume_b: Decimal,
    pub quote_volume: Decimal,
    pub fee_a: Decimal,
    pub fee_b: Decimal,
    pub tx_count: u64,
    pub trade_count: u64,
    pub balance_a: Option<Decimal>,
    pub balance_b: Option<Decimal>,
    pub tvl_usd: Option<Decimal>,
    pub last_block_time: i64,
    pub last_tx_id: u64,
}

impl PoolTotals {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            volume_a: Decimal::ZERO,
            volume_b: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            fee_a: Decimal::ZERO,
            fee_b: Decimal::ZERO,
            tx_count: 0,
            trade_count: 0,
            balance_a: None,
            balance_b: None,
            tvl_usd: None,
            last_block_time: i64::MIN,
            last_tx_id: 0,
        }
    }

    pub fn merge(&mut self, obs: &Observation) {
        self.volume_a = self.volume_a.saturating_add(obs.volume_a);
        self.volume_b = self.volume_b.saturating_add(obs.volume_b);
        self.quote_volume = self.quote_volume.saturating_add(obs.quote_volume);
        self.fee_a = self.fee_a.saturating_add(obs.fee_a);
        self.fee_b = self.fee_b.saturating_add(obs.fee_b);
        if obs.tx_id != self.last_tx_id {
            self.tx_count += 1;
            self.last_tx_id = obs.tx_id;
        }
        if obs.is_trade {
            self.trade_count += 1;
        }

        if obs.block_time >= self.last_block_time {
            self.balance_a = obs.balance_a.or(self.balance_a);
            self.balance_b = obs.balance_b.or(self.balance_b);
            self.last_block_time = obs.block_time;
            let tvl = tvl_usd(
                self.balance_a,
                self.balance_b,
                obs.usd_price_a,
                obs.usd_price_b,
            );
            self.tvl_usd = tvl.or(self.tvl_usd);
        }
    }
}

/// Sum of the sides whose balance and USD price are both known.
fn tvl_usd(
    balance_a: Option<Decimal>,
    balance_b: Option<Decimal>,
    usd_a: Option<Decimal>,
    usd_b: Option<Decimal>,
) -> Option<Decimal> {
    let side_a = balance_a.zip(usd_a).map(|(b, p)| b.saturating_mul(p));
    let side_b = balance_b.zip(usd_b).map(|(b, p)| b.saturating_mul(p));
    match (side_a, side_b) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (a, b) => a.or(b),
    }
}
