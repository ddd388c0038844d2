use serde::Serialize;

use crate::core::binary_reader::{BinaryReader, BinaryReaderError};
use crate::core::constants::event_log::EVENT_NAMESPACE;
use crate::core::constants::event_names;
use crate::core::discriminator::DiscriminatorRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    pub pool: String,
    pub user: String,
    /// Raw direction, `0` = A→B.
    pub direction: u8,
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee_amount: u64,
    pub protocol_fee: u64,
    pub referral_fee: u64,
    pub sqrt_price: u128,
    pub liquidity: u128,
    pub vault_a_balance: u64,
    pub vault_b_balance: u64,
    pub tick: i32,
}

impl SwapEvent {
    pub fn decode(data: &[u8]) -> Result<Self, BinaryReaderError> {
        let mut reader = BinaryReader::new(data);
        Ok(Self {
            pool: reader.read_pubkey()?,
            user: reader.read_pubkey()?,
            direction: reader.read_u8()?,
            amount_in: reader.read_u64()?,
            amount_out: reader.read_u64()?,
            fee_amount: reader.read_u64()?,
            protocol_fee: reader.read_u64()?,
            referral_fee: reader.read_u64()?,
            sqrt_price: reader.read_u128()?,
            liquidity: reader.read_u128()?,
            vault_a_balance: reader.read_u64()?,
            vault_b_balance: reader.read_u64()?,
            tick: reader.read_i32()?,
        })
    }
}

/// Shared layout of increase/decrease liquidity events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityEvent {
    pub pool: String,
    pub owner: String,
    pub position: String,
    pub liquidity: u128,
    pub amount_a: u64,
    pub amount_b: u64,
    pub vault_a_balance: u64,
    pub vault_b_balance: u64,
}

impl LiquidityEvent {
    pub fn decode(data: &[u8]) -> Result<Self, BinaryReaderError> {
        let mut reader = BinaryReader::new(data);
        Ok(Self {
            pool: reader.read_pubkey()?,
            owner: reader.read_pubkey()?,
            position: reader.read_pubkey()?,
            liquidity: reader.read_u128()?,
            amount_a: reader.read_u64()?,
            amount_b: reader.read_u64()?,
            vault_a_balance: reader.read_u64()?,
            vault_b_balance: reader.read_u64()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectFeeEvent {
    pub pool: String,
    pub owner: String,
    pub position: String,
    pub fee_a: u64,
    pub fee_b: u64,
    pub vault_a_balance: u64,
    pub vault_b_balance: u64,
}

impl CollectFeeEvent {
    pub fn decode(data: &[u8]) -> Result<Self, BinaryReaderError> {
        let mut reader = BinaryReader::new(data);
        Ok(Self {
            pool: reader.read_pubkey()?,
            owner: reader.read_pubkey()?,
            position: reader.read_pubkey()?,
            fee_a: reader.read_u64()?,
            fee_b: reader.read_u64()?,
            vault_a_balance: reader.read_u64()?,
            vault_b_balance: reader.read_u64()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum ProgramEvent {
    Swap(SwapEvent),
    IncreaseLiquidity(LiquidityEvent),
    DecreaseLiquidity(LiquidityEvent),
    CollectFee(CollectFeeEvent),
}

impl ProgramEvent {
    pub fn pool(&self) -> &str {
        match self {
            ProgramEvent::Swap(e) => &e.pool,
            ProgramEvent::IncreaseLiquidity(e) | ProgramEvent::DecreaseLiquidity(e) => &e.pool,
            ProgramEvent::CollectFee(e) => &e.pool,
        }
    }
}

/// Registry with every event this program emits.
pub fn default_registry() -> DiscriminatorRegistry<ProgramEvent> {
    let mut registry = DiscriminatorRegistry::new(EVENT_NAMESPACE);
    registry.register(event_names::SWAP, |data| {
        SwapEvent::decode(data).map(ProgramEvent::Swap)
    });
    registry.register(event_names::INCREASE_LIQUIDITY, |data| {
        LiquidityEvent::decode(data).map(ProgramEvent::IncreaseLiquidity)
    });
    registry.register(event_names::DECREASE_LIQUIDITY, |data| {
        LiquidityEvent::decode(data).map(ProgramEvent::DecreaseLiquidity)
    });
    registry.register(event_names::COLLECT_FEE, |data| {
        CollectFeeEvent::decode(data).map(ProgramEvent::CollectFee)
    });
    registry
}
