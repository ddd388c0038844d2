#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;

use clmm_indexer::core::constants::program_ids;
use clmm_indexer::core::discriminator::discriminator;
use clmm_indexer::core::price::StaticUsdPrices;
use clmm_indexer::driver::{PoolWorker, SharedContext, WorkerSettings};
use clmm_indexer::protocols::v2::{default_registry, CollectFeeEvent, LiquidityEvent, SwapEvent};
use clmm_indexer::store::{KlineStore, TransactionSource};
use clmm_indexer::types::{CompiledInstruction, TokenBalance};
use clmm_indexer::{
    EventDecoder, InstructionDecoder, PoolConfig, PoolRegistry, RawTransaction, RollupEngine,
    StoredTransaction,
};

pub const USER: &str = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi";
pub const V1_POOL: &str = "8qbHbw2BbbTHBW1sbeqakYXVKRQM8Ne7pLK7m6CVfeR";
pub const USER_TOKEN_A: &str = "CktRuQ2mttgRGkXJtyksdKHjUdc2C4TgDzyB98oEzy8";
pub const USER_TOKEN_B: &str = "GgBaCs3NCBuZN12kCJgAW63ydqohFkHEdfdEXBPzLHq";
pub const V1_VAULT_A: &str = "LbUiWL3xVV8hTFYBVdbTNrpDo41NKS6o3LHHuDzjfcY";
pub const V1_VAULT_B: &str = "QWmroo4YnnMqYW3cnxWkFdaTxGD3P7vMSzwMHGbUzwF";
pub const V2_POOL: &str = "cGfHiC6Kgg3FpFZvgwGcswsCRtp4aBP2fzuXRQPizuN";
pub const OWNER: &str = "p2Yicb86aZig616Eav2VWG9vuXR5mEqhtzshZYBxzsV";
pub const POSITION: &str = "swqrv48gsrwpBFbftEwnP2vB4jckpvfGJfXkwaniLCC";
pub const MINT_A: &str = "2MNus2KCpxwXnp19iyXNpWSFtBD2UGjQBAL8AbtywfT9";
pub const MINT_B: &str = "2RJD1KnDRGEkvuFfAGrJ7PD28LRE9LRDjZznDywagzmr";
pub const AGGREGATOR: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture<T: DeserializeOwned>(name: &str) -> Result<T> {
    let path = fixture_path(name);
    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse fixture {}", path.display()))
}

pub fn load_pools() -> Result<Vec<PoolConfig>> {
    load_fixture("pools.json")
}

pub fn pool(address: &str) -> Result<PoolConfig> {
    load_pools()?
        .into_iter()
        .find(|pool| pool.address == address)
        .with_context(|| format!("pool {address} missing from fixture"))
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn transfer(program_id_index: u8, amount: u64) -> CompiledInstruction {
    let mut data = vec![3u8];
    data.extend_from_slice(&amount.to_le_bytes());
    CompiledInstruction {
        program_id_index,
        accounts: vec![],
        data: encode(&data),
    }
}

pub fn non_transfer(program_id_index: u8, opcode: u8) -> CompiledInstruction {
    CompiledInstruction {
        program_id_index,
        accounts: vec![],
        data: encode(&[opcode, 0, 0, 0]),
    }
}

pub fn v1_swap_data(amount: u64, threshold: u64) -> String {
    let mut data = vec![1u8];
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&threshold.to_le_bytes());
    encode(&data)
}

pub fn v1_liquidity_data(opcode: u8, liquidity: u128) -> String {
    let mut data = vec![opcode];
    data.extend_from_slice(&liquidity.to_le_bytes());
    encode(&data)
}

pub fn balance(account_index: u8, mint: &str, amount: u64) -> TokenBalance {
    TokenBalance {
        account_index,
        mint: mint.to_string(),
        owner: None,
        amount: amount.to_string(),
        decimals: 6,
    }
}

/// Account key layout used by hand-built V1 position transactions.
pub fn position_keys() -> Vec<String> {
    [
        OWNER,
        V1_POOL,
        POSITION,
        USER_TOKEN_A,
        USER_TOKEN_B,
        V1_VAULT_A,
        V1_VAULT_B,
        program_ids::CLMM_V1,
        program_ids::TOKEN_PROGRAM,
        AGGREGATOR,
    ]
    .iter()
    .map(|key| key.to_string())
    .collect()
}

pub const POS_PROGRAM: u8 = 7;
pub const POS_TOKEN_PROGRAM: u8 = 8;
pub const POS_AGGREGATOR: u8 = 9;

fn pubkey_bytes(key: &str) -> Vec<u8> {
    bs58::decode(key).into_vec().unwrap_or_default()
}

pub fn swap_event_bytes(event: &SwapEvent) -> Vec<u8> {
    let mut data = discriminator("event", "SwapEvent").to_vec();
    data.extend(pubkey_bytes(&event.pool));
    data.extend(pubkey_bytes(&event.user));
    data.push(event.direction);
    for value in [
        event.amount_in,
        event.amount_out,
        event.fee_amount,
        event.protocol_fee,
        event.referral_fee,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data.extend_from_slice(&event.sqrt_price.to_le_bytes());
    data.extend_from_slice(&event.liquidity.to_le_bytes());
    data.extend_from_slice(&event.vault_a_balance.to_le_bytes());
    data.extend_from_slice(&event.vault_b_balance.to_le_bytes());
    data.extend_from_slice(&event.tick.to_le_bytes());
    data
}

pub fn liquidity_event_bytes(name: &str, event: &LiquidityEvent) -> Vec<u8> {
    let mut data = discriminator("event", name).to_vec();
    data.extend(pubkey_bytes(&event.pool));
    data.extend(pubkey_bytes(&event.owner));
    data.extend(pubkey_bytes(&event.position));
    data.extend_from_slice(&event.liquidity.to_le_bytes());
    for value in [
        event.amount_a,
        event.amount_b,
        event.vault_a_balance,
        event.vault_b_balance,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

pub fn collect_event_bytes(event: &CollectFeeEvent) -> Vec<u8> {
    let mut data = discriminator("event", "CollectFeeEvent").to_vec();
    data.extend(pubkey_bytes(&event.pool));
    data.extend(pubkey_bytes(&event.owner));
    data.extend(pubkey_bytes(&event.position));
    for value in [
        event.fee_a,
        event.fee_b,
        event.vault_a_balance,
        event.vault_b_balance,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

pub fn program_data_line(bytes: &[u8]) -> String {
    format!("Program data: {}", encode(bytes))
}

/// A-to-B swap of `amount_a` raw A units for `amount_b` raw B units on the V2 pool.
pub fn v2_swap(amount_a: u64, amount_b: u64) -> SwapEvent {
    SwapEvent {
        pool: V2_POOL.to_string(),
        user: USER.to_string(),
        direction: 0,
        amount_in: amount_a,
        amount_out: amount_b,
        fee_amount: 0,
        protocol_fee: 0,
        referral_fee: 0,
        sqrt_price: 0,
        liquidity: 0,
        vault_a_balance: 1_000_000_000_000,
        vault_b_balance: 1_000_000_000,
        tick: 0,
    }
}

/// V2 transaction whose log carries one line per event payload.
pub fn v2_transaction(
    id: u64,
    slot: u64,
    block_time: i64,
    payloads: &[Vec<u8>],
) -> StoredTransaction {
    let mut log_messages = vec![format!("Program {} invoke [1]", program_ids::CLMM_V2)];
    log_messages.extend(payloads.iter().map(|bytes| program_data_line(bytes)));
    log_messages.push(format!("Program {} success", program_ids::CLMM_V2));
    let signature = format!("sig-{id}");
    StoredTransaction {
        id,
        pool: V2_POOL.to_string(),
        slot,
        signature: signature.clone(),
        block_time,
        tx: RawTransaction {
            signature,
            slot,
            block_time,
            log_messages,
            ..RawTransaction::default()
        },
    }
}

pub fn shared_context<S>(store: Arc<S>, pools: Vec<PoolConfig>) -> SharedContext
where
    S: KlineStore + TransactionSource + 'static,
{
    SharedContext {
        registry: PoolRegistry::new(pools),
        v1: Arc::new(InstructionDecoder::new(program_ids::CLMM_V1)),
        v2: Arc::new(EventDecoder::new(Arc::new(default_registry()))),
        engine: Arc::new(RollupEngine::new(Arc::new(StaticUsdPrices::default()))),
        store: store.clone(),
        source: store,
        settings: WorkerSettings {
            page_size: 2,
            fetch_retries: 0,
            retry_backoff: std::time::Duration::ZERO,
        },
    }
}

pub fn v2_worker<S>(store: Arc<S>) -> Result<PoolWorker>
where
    S: KlineStore + TransactionSource + 'static,
{
    Ok(PoolWorker::new(V2_POOL, shared_context(store, load_pools()?)))
}
