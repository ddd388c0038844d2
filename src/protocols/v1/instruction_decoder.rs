use serde::Serialize;

use crate::core::binary_reader::{read_u64_at, BinaryReader};
use crate::core::constants::token_opcodes::{AMOUNT_OFFSET, TRANSFER};
use crate::core::constants::v1_layouts::{decrease_liquidity, increase_liquidity, swap};
use crate::core::constants::v1_opcodes;
use crate::core::pool_registry::PoolLookup;
use crate::core::utils::instruction_data;
use crate::protocols::error::DecodeError;
use crate::types::{CompiledInstruction, PoolConfig, RawTransaction};

use super::balance::{reconcile, VaultSnapshot};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum V1Kind {
    Swap,
    IncreaseLiquidity,
    DecreaseLiquidity,
    Claim,
}

impl V1Kind {
    fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            v1_opcodes::SWAP => Some(V1Kind::Swap),
            v1_opcodes::INCREASE_LIQUIDITY => Some(V1Kind::IncreaseLiquidity),
            v1_opcodes::DECREASE_LIQUIDITY => Some(V1Kind::DecreaseLiquidity),
            v1_opcodes::CLAIM => Some(V1Kind::Claim),
            _ => None,
        }
    }
}

/// Where a matching instruction sits inside the transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionLocation {
    pub outer_index: usize,
    pub inner_index: Option<usize>,
}

impl InstructionLocation {
    /// First inner position holding this instruction's settlement transfers.
    fn settlement_start(&self) -> usize {
        match self.inner_index {
            Some(pos) => pos + 1,
            None => 0,
        }
    }

    /// Stable ordering key within the transaction.
    pub fn seq(&self) -> u32 {
        let outer = (self.outer_index as u32) << 16;
        match self.inner_index {
            Some(pos) => outer | (pos as u32 + 1),
            None => outer,
        }
    }
}

/// Raw, undecorated result of decoding one V1 instruction. Amounts are raw token units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct V1Count {
    pub kind: V1Kind,
    pub location: InstructionLocation,
    /// Resolved pool address from configuration.
    pub pool: String,
    pub user: String,
    pub position: Option<String>,
    pub vault_a: String,
    pub vault_b: String,
    pub user_token_a: String,
    pub user_token_b: String,
    /// `1` when token A flows into the pool; always `1` for non-swaps.
    pub raw_direction: u8,
    /// Swap only: the amount argument of the instruction.
    pub amount_specified: u64,
    pub liquidity: u128,
    pub amount_a: u64,
    pub amount_b: u64,
    pub balance_a: Option<u64>,
    pub balance_b: Option<u64>,
}

impl V1Count {
    pub fn is_a_to_b(&self) -> bool {
        self.raw_direction == 1
    }
}

/// Account resolved from an instruction's positional list.
struct Account<'a> {
    index: u8,
    key: &'a str,
}

pub struct InstructionDecoder {
    program_id: String,
}

impl InstructionDecoder {
    pub fn new(program_id: impl Into<String>) -> Self {
        Self {
            program_id: program_id.into(),
        }
    }

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    /// Decodes every matching top-level and inner instruction in order.
    /// Malformed instructions are logged and skipped.
    pub fn decode_transaction(&self, tx: &RawTransaction, pools: &dyn PoolLookup) -> Vec<V1Count> {
        self.scan_transaction(tx, pools).0
    }

    /// Like [`InstructionDecoder::decode_transaction`], also returning the
    /// error of every malformed instruction.
    pub fn scan_transaction(
        &self,
        tx: &RawTransaction,
        pools: &dyn PoolLookup,
    ) -> (Vec<V1Count>, Vec<DecodeError>) {
        let mut counts = Vec::new();
        let mut errors = Vec::new();
        for (outer_index, instruction) in tx.instructions.iter().enumerate() {
            let location = InstructionLocation {
                outer_index,
                inner_index: None,
            };
            self.push_decoded(tx, pools, instruction, location, &mut counts, &mut errors);

            if let Some(group) = tx.inner_group(outer_index) {
                for (pos, inner) in group.instructions.iter().enumerate() {
                    let location = InstructionLocation {
                        outer_index,
                        inner_index: Some(pos),
                    };
                    self.push_decoded(tx, pools, inner, location, &mut counts, &mut errors);
                }
            }
        }
        (counts, errors)
    }

    fn push_decoded(
        &self,
        tx: &RawTransaction,
        pools: &dyn PoolLookup,
        instruction: &CompiledInstruction,
        location: InstructionLocation,
        out: &mut Vec<V1Count>,
        errors: &mut Vec<DecodeError>,
    ) {
        match self.decode_instruction(tx, pools, instruction, location) {
            Ok(Some(count)) => out.push(count),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(
                    signature = %tx.signature,
                    outer = location.outer_index,
                    inner = ?location.inner_index,
                    "skipping malformed v1 instruction: {err}"
                );
                errors.push(err);
            }
        }
    }

    /// `Ok(None)` for instructions that are not ours, unknown opcodes and unresolved pools.
    pub fn decode_instruction(
        &self,
        tx: &RawTransaction,
        pools: &dyn PoolLookup,
        instruction: &CompiledInstruction,
        location: InstructionLocation,
    ) -> Result<Option<V1Count>, DecodeError> {
        match tx.account_key(instruction.program_id_index) {
            Some(program) if program == self.program_id => {}
            _ => return Ok(None),
        }

        let data = instruction_data(instruction)?;
        let Some(&opcode) = data.first() else {
            return Err(DecodeError::short_data(1, 0));
        };
        let Some(kind) = V1Kind::from_opcode(opcode) else {
            tracing::debug!(opcode, "ignoring unknown v1 opcode");
            return Ok(None);
        };

        match kind {
            V1Kind::Swap => self.decode_swap(tx, pools, instruction, &data, location),
            _ => self.decode_position_op(tx, pools, instruction, kind, &data, location),
        }
    }

    fn decode_swap(
        &self,
        tx: &RawTransaction,
        pools: &dyn PoolLookup,
        instruction: &CompiledInstruction,
        data: &[u8],
        location: InstructionLocation,
    ) -> Result<Option<V1Count>, DecodeError> {
        // opcode + amount + other_amount_threshold
        if data.len() < 17 {
            return Err(DecodeError::short_data(17, data.len()));
        }
        if instruction.accounts.len() < swap::MIN_ACCOUNTS {
            return Err(DecodeError::missing_account(
                "swap accounts",
                instruction.accounts.len(),
            ));
        }
        let mut reader = BinaryReader::new(&data[1..]);
        let amount_specified = reader.read_u64()?;

        let pool_account = account_at(tx, instruction, swap::POOL, "pool")?;
        let user = account_at(tx, instruction, swap::USER, "user")?;
        let user_in = account_at(tx, instruction, swap::USER_TOKEN_IN, "user token in")?;
        let user_out = account_at(tx, instruction, swap::USER_TOKEN_OUT, "user token out")?;
        let vault_in = account_at(tx, instruction, swap::VAULT_IN, "vault in")?;
        let vault_out = account_at(tx, instruction, swap::VAULT_OUT, "vault out")?;

        let Some(pool) = resolve_pool(pools, pool_account.key, vault_in.key) else {
            tracing::debug!(pool = pool_account.key, "swap for unconfigured pool");
            return Ok(None);
        };

        let a_to_b = if vault_in.key == pool.token_a_vault {
            true
        } else if vault_in.key == pool.token_b_vault {
            false
        } else {
            return Err(DecodeError::VaultMismatch {
                pool: pool.address.clone(),
                vault: vault_in.key.to_string(),
            });
        };

        let (vault_a, vault_b, user_a, user_b) = if a_to_b {
            (vault_in, vault_out, user_in, user_out)
        } else {
            (vault_out, vault_in, user_out, user_in)
        };

        let following = settlement_group(tx, location);
        let input = transfer_amount_at(following, 0);
        let output = transfer_amount_at(following, 1);
        let (transfer_a, transfer_b) = if a_to_b {
            (input, output)
        } else {
            (output, input)
        };

        let settled = reconcile(
            transfer_a,
            transfer_b,
            VaultSnapshot::from_tx(tx, vault_a.index),
            VaultSnapshot::from_tx(tx, vault_b.index),
        )?;

        Ok(Some(V1Count {
            kind: V1Kind::Swap,
            location,
            pool: pool.address.clone(),
            user: user.key.to_string(),
            position: None,
            vault_a: vault_a.key.to_string(),
            vault_b: vault_b.key.to_string(),
            user_token_a: user_a.key.to_string(),
            user_token_b: user_b.key.to_string(),
            raw_direction: u8::from(a_to_b),
            amount_specified,
            liquidity: 0,
            amount_a: settled.amount_a,
            amount_b: settled.amount_b,
            balance_a: settled.balance_a,
            balance_b: settled.balance_b,
        }))
    }

    fn decode_position_op(
        &self,
        tx: &RawTransaction,
        pools: &dyn PoolLookup,
        instruction: &CompiledInstruction,
        kind: V1Kind,
        data: &[u8],
        location: InstructionLocation,
    ) -> Result<Option<V1Count>, DecodeError> {
        let liquidity = match kind {
            V1Kind::IncreaseLiquidity | V1Kind::DecreaseLiquidity => {
                if data.len() < 17 {
                    return Err(DecodeError::short_data(17, data.len()));
                }
                BinaryReader::new(&data[1..]).read_u128()?
            }
            _ => 0,
        };

        let (pool_pos, owner_pos, position_pos, vault_a_pos, vault_b_pos, user_a_pos, user_b_pos) =
            match kind {
                V1Kind::IncreaseLiquidity => (
                    increase_liquidity::POOL,
                    increase_liquidity::OWNER,
                    increase_liquidity::POSITION,
                    increase_liquidity::VAULT_A,
                    increase_liquidity::VAULT_B,
                    increase_liquidity::USER_TOKEN_A,
                    increase_liquidity::USER_TOKEN_B,
                ),
                _ => (
                    decrease_liquidity::POOL,
                    decrease_liquidity::OWNER,
                    decrease_liquidity::POSITION,
                    decrease_liquidity::VAULT_A,
                    decrease_liquidity::VAULT_B,
                    decrease_liquidity::USER_TOKEN_A,
                    decrease_liquidity::USER_TOKEN_B,
                ),
            };

        let pool_account = account_at(tx, instruction, pool_pos, "pool")?;
        let owner = account_at(tx, instruction, owner_pos, "owner")?;
        let position = account_at(tx, instruction, position_pos, "position")?;
        let vault_a = account_at(tx, instruction, vault_a_pos, "vault a")?;
        let vault_b = account_at(tx, instruction, vault_b_pos, "vault b")?;
        let user_a = account_at(tx, instruction, user_a_pos, "user token a")?;
        let user_b = account_at(tx, instruction, user_b_pos, "user token b")?;

        let Some(pool) = resolve_pool(pools, pool_account.key, vault_a.key) else {
            tracing::debug!(pool = pool_account.key, "position op for unconfigured pool");
            return Ok(None);
        };
        if vault_a.key != pool.token_a_vault || vault_b.key != pool.token_b_vault {
            return Err(DecodeError::VaultMismatch {
                pool: pool.address.clone(),
                vault: vault_a.key.to_string(),
            });
        }

        let following = settlement_group(tx, location);
        let first = liquidity_transfer_start(following);
        let settled = reconcile(
            transfer_amount_at(following, first),
            transfer_amount_at(following, first + 1),
            VaultSnapshot::from_tx(tx, vault_a.index),
            VaultSnapshot::from_tx(tx, vault_b.index),
        )?;

        Ok(Some(V1Count {
            kind,
            location,
            pool: pool.address.clone(),
            user: owner.key.to_string(),
            position: Some(position.key.to_string()),
            vault_a: vault_a.key.to_string(),
            vault_b: vault_b.key.to_string(),
            user_token_a: user_a.key.to_string(),
            user_token_b: user_b.key.to_string(),
            raw_direction: 1,
            amount_specified: 0,
            liquidity,
            amount_a: settled.amount_a,
            amount_b: settled.amount_b,
            balance_a: settled.balance_a,
            balance_b: settled.balance_b,
        }))
    }
}

/// Offset of the first liquidity settlement transfer within `following`.
///
/// When the instruction right after the match does not start with the token
/// Transfer opcode, one position is skipped. Whatever sits at the new position
/// is read as the A transfer without further checks.
pub fn liquidity_transfer_start(following: &[CompiledInstruction]) -> usize {
    let leading_opcode = following
        .first()
        .and_then(|ix| instruction_data(ix).ok())
        .and_then(|data| data.first().copied());
    match leading_opcode {
        Some(TRANSFER) => 0,
        _ => 1,
    }
}

/// Inner instructions that follow the match, in execution order.
fn settlement_group(tx: &RawTransaction, location: InstructionLocation) -> &[CompiledInstruction] {
    let Some(group) = tx.inner_group(location.outer_index) else {
        return &[];
    };
    group
        .instructions
        .get(location.settlement_start()..)
        .unwrap_or(&[])
}

fn transfer_amount_at(following: &[CompiledInstruction], pos: usize) -> Option<u64> {
    let ix = following.get(pos)?;
    let data = instruction_data(ix).ok()?;
    read_u64_at(&data, AMOUNT_OFFSET)
}

fn account_at<'a>(
    tx: &'a RawTransaction,
    instruction: &CompiledInstruction,
    position: usize,
    name: &'static str,
) -> Result<Account<'a>, DecodeError> {
    let index = *instruction
        .accounts
        .get(position)
        .ok_or(DecodeError::missing_account(name, position))?;
    let key = tx
        .account_key(index)
        .ok_or(DecodeError::AccountIndex(index))?;
    Ok(Account { index, key })
}

fn resolve_pool<'p>(
    pools: &'p dyn PoolLookup,
    pool_key: &str,
    vault_key: &str,
) -> Option<&'p PoolConfig> {
    pools
        .lookup_pool_by_address(pool_key)
        .or_else(|| pools.lookup_pool_by_address(vault_key))
}
