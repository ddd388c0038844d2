use rust_decimal::Decimal;

use crate::core::constants::FEE_RATE_DENOMINATOR;
use crate::core::pool_registry::PoolLookup;
use crate::core::utils::scale_amount;
use crate::protocols::v1::{V1Count, V1Kind};
use crate::protocols::v2::{DecodedEvent, ProgramEvent};
use crate::types::{
    CanonicalRecord, CollectRecord, Direction, LiquidityKind, LiquidityRecord, PoolConfig,
    ProtocolVersion, RecordHeader, SwapRecord, TxMeta,
};

/// Token B per token A. `None` when either side is zero.
pub fn swap_price(volume_a: Decimal, volume_b: Decimal) -> Option<Decimal> {
    if volume_a.is_zero() || volume_b.is_zero() {
        return None;
    }
    volume_b.checked_div(volume_a)
}

/// Fee charged on the input amount, floored to raw units.
pub fn v1_swap_fee(amount_in: u64, fee_rate: u32) -> u64 {
    let fee = u128::from(amount_in) * u128::from(fee_rate) / u128::from(FEE_RATE_DENOMINATOR);
    u64::try_from(fee).unwrap_or(u64::MAX)
}

/// Normalizes decoder output into [`CanonicalRecord`]s. Records whose pool
/// is not configured are dropped.
pub struct RecordBuilder<'a> {
    pools: &'a dyn PoolLookup,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(pools: &'a dyn PoolLookup) -> Self {
        Self { pools }
    }

    pub fn from_v1(&self, count: &V1Count, tx: &TxMeta) -> Option<CanonicalRecord> {
        let Some(pool) = self.pools.lookup_pool_by_address(&count.pool) else {
            tracing::debug!(pool = %count.pool, "dropping v1 record for unknown pool");
            return None;
        };
        let header = header(ProtocolVersion::V1, pool, &count.user, tx, count.location.seq());
        let balance_a = count.balance_a.map(|b| scale_amount(b, pool.token_a_decimals));
        let balance_b = count.balance_b.map(|b| scale_amount(b, pool.token_b_decimals));
        let amount_a = scale_amount(count.amount_a, pool.token_a_decimals);
        let amount_b = scale_amount(count.amount_b, pool.token_b_decimals);

        let record = match count.kind {
            V1Kind::Swap => {
                let direction = Direction::from_v1_raw(count.raw_direction);
                let (raw_in, in_decimals) = match direction {
                    Direction::AToB => (count.amount_a, pool.token_a_decimals),
                    Direction::BToA => (count.amount_b, pool.token_b_decimals),
                };
                let fee = v1_swap_fee(raw_in, pool.fee_rate);
                CanonicalRecord::Swap(SwapRecord {
                    header,
                    direction,
                    raw_direction: count.raw_direction,
                    volume_a: amount_a,
                    volume_b: amount_b,
                    balance_a,
                    balance_b,
                    fee_amount: scale_amount(fee, in_decimals),
                    protocol_fee: Decimal::ZERO,
                    referral_fee: Decimal::ZERO,
                    price: swap_price(amount_a, amount_b),
                })
            }
            V1Kind::IncreaseLiquidity | V1Kind::DecreaseLiquidity => {
                let kind = if count.kind == V1Kind::IncreaseLiquidity {
                    LiquidityKind::Increase
                } else {
                    LiquidityKind::Decrease
                };
                CanonicalRecord::Liquidity(LiquidityRecord {
                    header,
                    kind,
                    liquidity_delta: liquidity_delta(kind, count.liquidity),
                    amount_a,
                    amount_b,
                    balance_a,
                    balance_b,
                })
            }
            V1Kind::Claim => CanonicalRecord::Collect(CollectRecord {
                header,
                fee_a: amount_a,
                fee_b: amount_b,
                balance_a,
                balance_b,
            }),
        };
        Some(record)
    }

    pub fn from_v2(&self, decoded: &DecodedEvent, tx: &TxMeta) -> Option<CanonicalRecord> {
        let event = &decoded.event;
        let Some(pool) = self.pools.lookup_pool_by_address(event.pool()) else {
            tracing::debug!(pool = event.pool(), "dropping v2 record for unknown pool");
            return None;
        };
        let seq = decoded.log_index as u32;
        let dec_a = pool.token_a_decimals;
        let dec_b = pool.token_b_decimals;

        let record = match event {
            ProgramEvent::Swap(e) => {
                let direction = Direction::from_v2_raw(e.direction);
                let (raw_a, raw_b, in_decimals) = match direction {
                    Direction::AToB => (e.amount_in, e.amount_out, dec_a),
                    Direction::BToA => (e.amount_out, e.amount_in, dec_b),
                };
                let volume_a = scale_amount(raw_a, dec_a);
                let volume_b = scale_amount(raw_b, dec_b);
                CanonicalRecord::Swap(SwapRecord {
                    header: header(ProtocolVersion::V2, pool, &e.user, tx, seq),
                    direction,
                    raw_direction: e.direction,
                    volume_a,
                    volume_b,
                    balance_a: Some(scale_amount(e.vault_a_balance, dec_a)),
                    balance_b: Some(scale_amount(e.vault_b_balance, dec_b)),
                    fee_amount: scale_amount(e.fee_amount, in_decimals),
                    protocol_fee: scale_amount(e.protocol_fee, in_decimals),
                    referral_fee: scale_amount(e.referral_fee, in_decimals),
                    price: swap_price(volume_a, volume_b),
                })
            }
            ProgramEvent::IncreaseLiquidity(e) | ProgramEvent::DecreaseLiquidity(e) => {
                let kind = if matches!(event, ProgramEvent::IncreaseLiquidity(_)) {
                    LiquidityKind::Increase
                } else {
                    LiquidityKind::Decrease
                };
                CanonicalRecord::Liquidity(LiquidityRecord {
                    header: header(ProtocolVersion::V2, pool, &e.owner, tx, seq),
                    kind,
                    liquidity_delta: liquidity_delta(kind, e.liquidity),
                    amount_a: scale_amount(e.amount_a, dec_a),
                    amount_b: scale_amount(e.amount_b, dec_b),
                    balance_a: Some(scale_amount(e.vault_a_balance, dec_a)),
                    balance_b: Some(scale_amount(e.vault_b_balance, dec_b)),
                })
            }
            ProgramEvent::CollectFee(e) => CanonicalRecord::Collect(CollectRecord {
                header: header(ProtocolVersion::V2, pool, &e.owner, tx, seq),
                fee_a: scale_amount(e.fee_a, dec_a),
                fee_b: scale_amount(e.fee_b, dec_b),
                balance_a: Some(scale_amount(e.vault_a_balance, dec_a)),
                balance_b: Some(scale_amount(e.vault_b_balance, dec_b)),
            }),
        };
        Some(record)
    }
}

fn header(
    version: ProtocolVersion,
    pool: &PoolConfig,
    user: &str,
    tx: &TxMeta,
    seq: u32,
) -> RecordHeader {
    RecordHeader {
        version,
        pool: pool.address.clone(),
        user: user.to_string(),
        tx: tx.clone(),
        seq,
    }
}

fn liquidity_delta(kind: LiquidityKind, liquidity: u128) -> i128 {
    let magnitude = i128::try_from(liquidity).unwrap_or(i128::MAX);
    match kind {
        LiquidityKind::Increase => magnitude,
        LiquidityKind::Decrease => -magnitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool_registry::PoolSnapshot;
    use crate::protocols::v1::InstructionLocation;
    use crate::protocols::v2::SwapEvent;
    use std::str::FromStr;

    fn pool() -> PoolConfig {
        PoolConfig {
            address: "pool".into(),
            version: ProtocolVersion::V1,
            token_a_mint: "mint-a".into(),
            token_b_mint: "mint-b".into(),
            token_a_vault: "vault-a".into(),
            token_b_vault: "vault-b".into(),
            token_a_decimals: 9,
            token_b_decimals: 6,
            fee_rate: 2500,
        }
    }

    fn meta() -> TxMeta {
        TxMeta {
            tx_id: 7,
            signature: "sig".into(),
            slot: 100,
            block_time: 1_700_000_000,
        }
    }

    fn v1_swap(raw_direction: u8, amount_a: u64, amount_b: u64) -> V1Count {
        V1Count {
            kind: V1Kind::Swap,
            location: InstructionLocation {
                outer_index: 0,
                inner_index: None,
            },
            pool: "pool".into(),
            user: "user".into(),
            position: None,
            vault_a: "vault-a".into(),
            vault_b: "vault-b".into(),
            user_token_a: "ua".into(),
            user_token_b: "ub".into(),
            raw_direction,
            amount_specified: 0,
            liquidity: 0,
            amount_a,
            amount_b,
            balance_a: Some(5_000_000_000),
            balance_b: None,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn price_is_b_per_a_in_both_directions() {
        let pools = PoolSnapshot::new(vec![pool()]);
        let builder = RecordBuilder::new(&pools);

        // 2 A for 3 B, then 3 B for 2 A.
        let a_to_b = builder.from_v1(&v1_swap(1, 2_000_000_000, 3_000_000), &meta()).unwrap();
        let b_to_a = builder.from_v1(&v1_swap(0, 2_000_000_000, 3_000_000), &meta()).unwrap();
        assert_eq!(a_to_b.price(), Some(dec("1.5")));
        assert_eq!(b_to_a.price(), Some(dec("1.5")));

        match (a_to_b, b_to_a) {
            (CanonicalRecord::Swap(x), CanonicalRecord::Swap(y)) => {
                assert_eq!(x.direction, Direction::AToB);
                assert_eq!(y.direction, Direction::BToA);
                assert_eq!(y.raw_direction, 0);
                // 0.25% of the input side
                assert_eq!(x.fee_amount, dec("0.005"));
                assert_eq!(y.fee_amount, dec("0.0075"));
                assert_eq!(x.balance_a, Some(dec("5")));
                assert_eq!(x.balance_b, None);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn zero_side_has_no_price() {
        assert_eq!(swap_price(Decimal::ZERO, Decimal::ONE), None);
        assert_eq!(swap_price(Decimal::ONE, Decimal::ZERO), None);

        let pools = PoolSnapshot::new(vec![pool()]);
        let record = RecordBuilder::new(&pools)
            .from_v1(&v1_swap(1, 1_000, 0), &meta())
            .unwrap();
        assert_eq!(record.price(), None);
    }

    #[test]
    fn v2_polarity_is_inverted_from_v1() {
        let pools = PoolSnapshot::new(vec![pool()]);
        let event = DecodedEvent {
            name: "SwapEvent",
            log_index: 3,
            event: ProgramEvent::Swap(SwapEvent {
                pool: "pool".into(),
                user: "trader".into(),
                direction: 0,
                amount_in: 1_000_000_000,
                amount_out: 2_000_000,
                fee_amount: 3_000_000,
                protocol_fee: 1_000_000,
                referral_fee: 0,
                sqrt_price: 0,
                liquidity: 0,
                vault_a_balance: 10_000_000_000,
                vault_b_balance: 20_000_000,
                tick: -5,
            }),
        };
        let record = RecordBuilder::new(&pools).from_v2(&event, &meta()).unwrap();
        match record {
            CanonicalRecord::Swap(swap) => {
                assert_eq!(swap.direction, Direction::AToB);
                assert_eq!(swap.header.seq, 3);
                assert_eq!(swap.header.user, "trader");
                assert_eq!(swap.volume_a, dec("1"));
                assert_eq!(swap.volume_b, dec("2"));
                assert_eq!(swap.fee_amount, dec("0.003"));
                assert_eq!(swap.price, Some(dec("2")));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn unknown_pool_is_dropped() {
        let pools = PoolSnapshot::new(vec![]);
        assert!(RecordBuilder::new(&pools)
            .from_v1(&v1_swap(1, 1, 1), &meta())
            .is_none());
    }

    #[test]
    fn fee_floors_to_raw_units() {
        assert_eq!(v1_swap_fee(999, 1000), 0);
        assert_eq!(v1_swap_fee(1_000_000, 3000), 3000);
        assert_eq!(v1_swap_fee(u64::MAX, 1_000_000), u64::MAX);
    }
}
