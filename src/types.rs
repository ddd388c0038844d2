use std::fmt;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which on-chain encoding a pool speaks.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Opcode + positional accounts, amounts settled by inner transfers.
    V1,
    /// Discriminator-tagged events emitted into the program log.
    V2,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "v1" => Some(ProtocolVersion::V1),
            "v2" => Some(ProtocolVersion::V2),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool metadata owned by the config collaborator; read-only for the indexer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub address: String,
    pub version: ProtocolVersion,
    pub token_a_mint: String,
    pub token_b_mint: String,
    pub token_a_vault: String,
    pub token_b_vault: String,
    pub token_a_decimals: u8,
    pub token_b_decimals: u8,
    /// Fee rate in parts per million of the input amount.
    #[serde(default)]
    pub fee_rate: u32,
}

/// Raw token balance snapshot as reported by transaction meta.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: u8,
    pub mint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Raw integer amount as a decimal string.
    pub amount: String,
    pub decimals: u8,
}

impl TokenBalance {
    pub fn raw_amount(&self) -> Option<u64> {
        self.amount.parse().ok()
    }
}

/// Compiled instruction referencing the transaction's flat account-key list.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    #[serde(default)]
    pub accounts: Vec<u8>,
    /// Instruction payload, standard base64.
    #[serde(default)]
    pub data: String,
}

/// Inner instructions emitted while executing top-level instruction `index`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InnerInstructionGroup {
    pub index: u8,
    #[serde(default)]
    pub instructions: Vec<CompiledInstruction>,
}

/// Normalized transaction payload consumed by both decoders.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: i64,
    /// Static keys followed by loaded writable then readonly addresses.
    #[serde(default)]
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<CompiledInstruction>,
    #[serde(default)]
    pub inner_instructions: Vec<InnerInstructionGroup>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub log_messages: Vec<String>,
    #[serde(default)]
    pub failed: bool,
}

impl RawTransaction {
    pub fn account_key(&self, index: u8) -> Option<&str> {
        self.account_keys.get(index as usize).map(String::as_str)
    }

    pub fn inner_group(&self, outer_index: usize) -> Option<&InnerInstructionGroup> {
        self.inner_instructions
            .iter()
            .find(|group| group.index as usize == outer_index)
    }

    pub fn post_balance(&self, account_index: u8) -> Option<&TokenBalance> {
        self.post_token_balances
            .iter()
            .find(|b| b.account_index == account_index)
    }

    pub fn pre_balance(&self, account_index: u8) -> Option<&TokenBalance> {
        self.pre_token_balances
            .iter()
            .find(|b| b.account_index == account_index)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| anyhow!("failed to deserialize raw transaction: {err}"))
    }
}

/// Persisted transaction row handed to a pool worker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    pub id: u64,
    pub pool: String,
    pub slot: u64,
    pub signature: String,
    pub block_time: i64,
    pub tx: RawTransaction,
}

impl StoredTransaction {
    pub fn meta(&self) -> TxMeta {
        TxMeta {
            tx_id: self.id,
            signature: self.signature.clone(),
            slot: self.slot,
            block_time: self.block_time,
        }
    }
}

/// Identity of the source transaction carried on every canonical record.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    pub tx_id: u64,
    pub signature: String,
    pub slot: u64,
    pub block_time: i64,
}

/// Swap direction, normalized so that `0` always means token A into the pool.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    AToB,
    BToA,
}

impl Direction {
    pub fn as_u8(&self) -> u8 {
        match self {
            Direction::AToB => 0,
            Direction::BToA => 1,
        }
    }

    /// V1 encodes the `a_to_b` flag, so `1` is A→B.
    pub fn from_v1_raw(raw: u8) -> Self {
        if raw == 1 {
            Direction::AToB
        } else {
            Direction::BToA
        }
    }

    /// V2 events already use `0` for A→B.
    pub fn from_v2_raw(raw: u8) -> Self {
        if raw == 0 {
            Direction::AToB
        } else {
            Direction::BToA
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }
}

/// Fields shared by every canonical record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub version: ProtocolVersion,
    pub pool: String,
    pub user: String,
    pub tx: TxMeta,
    /// Position of the source instruction/event inside the transaction.
    pub seq: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub header: RecordHeader,
    pub direction: Direction,
    pub raw_direction: u8,
    pub volume_a: Decimal,
    pub volume_b: Decimal,
    #[serde(default)]
    pub balance_a: Option<Decimal>,
    #[serde(default)]
    pub balance_b: Option<Decimal>,
    pub fee_amount: Decimal,
    pub protocol_fee: Decimal,
    pub referral_fee: Decimal,
    /// Token B per token A; absent when either side is zero.
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityKind {
    Increase,
    Decrease,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityRecord {
    pub header: RecordHeader,
    pub kind: LiquidityKind,
    /// Signed: negative for decreases.
    pub liquidity_delta: i128,
    pub amount_a: Decimal,
    pub amount_b: Decimal,
    #[serde(default)]
    pub balance_a: Option<Decimal>,
    #[serde(default)]
    pub balance_b: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectRecord {
    pub header: RecordHeader,
    pub fee_a: Decimal,
    pub fee_b: Decimal,
    #[serde(default)]
    pub balance_a: Option<Decimal>,
    #[serde(default)]
    pub balance_b: Option<Decimal>,
}

/// Version-agnostic record consumed by the rollup engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanonicalRecord {
    Swap(SwapRecord),
    Liquidity(LiquidityRecord),
    Collect(CollectRecord),
}

impl CanonicalRecord {
    pub fn header(&self) -> &RecordHeader {
        match self {
            CanonicalRecord::Swap(r) => &r.header,
            CanonicalRecord::Liquidity(r) => &r.header,
            CanonicalRecord::Collect(r) => &r.header,
        }
    }

    pub fn pool(&self) -> &str {
        &self.header().pool
    }

    pub fn user(&self) -> &str {
        &self.header().user
    }

    pub fn version(&self) -> ProtocolVersion {
        self.header().version
    }

    pub fn tx_id(&self) -> u64 {
        self.header().tx.tx_id
    }

    pub fn block_time(&self) -> i64 {
        self.header().tx.block_time
    }

    pub fn price(&self) -> Option<Decimal> {
        match self {
            CanonicalRecord::Swap(r) => r.price,
            _ => None,
        }
    }

    /// Traded volume; only swaps contribute.
    pub fn volumes(&self) -> (Decimal, Decimal) {
        match self {
            CanonicalRecord::Swap(r) => (r.volume_a, r.volume_b),
            _ => (Decimal::ZERO, Decimal::ZERO),
        }
    }

    /// Fees attributed to token A and token B.
    pub fn fees(&self) -> (Decimal, Decimal) {
        match self {
            CanonicalRecord::Swap(r) => match r.direction {
                Direction::AToB => (r.fee_amount, Decimal::ZERO),
                Direction::BToA => (Decimal::ZERO, r.fee_amount),
            },
            _ => (Decimal::ZERO, Decimal::ZERO),
        }
    }

    pub fn balances(&self) -> (Option<Decimal>, Option<Decimal>) {
        match self {
            CanonicalRecord::Swap(r) => (r.balance_a, r.balance_b),
            CanonicalRecord::Liquidity(r) => (r.balance_a, r.balance_b),
            CanonicalRecord::Collect(r) => (r.balance_a, r.balance_b),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CanonicalRecord::Swap(_) => "swap",
            CanonicalRecord::Liquidity(_) => "liquidity",
            CanonicalRecord::Collect(_) => "collect",
        }
    }
}
