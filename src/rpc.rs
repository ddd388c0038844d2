use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use solana_client::rpc_client::{GetConfirmedSignaturesForAddress2Config, RpcClient};
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiCompiledInstruction,
    UiInnerInstructions, UiInstruction, UiLoadedAddresses, UiMessage, UiParsedInstruction,
    UiTransactionEncoding, UiTransactionStatusMeta, UiTransactionTokenBalance,
};

use crate::types::{CompiledInstruction, InnerInstructionGroup, RawTransaction, TokenBalance};

/// Fetch a confirmed transaction and convert it into a [`RawTransaction`].
pub fn fetch_transaction(rpc_url: &str, signature: &str) -> Result<RawTransaction> {
    let client = RpcClient::new(rpc_url.to_string());
    let signature = Signature::from_str(signature).context("invalid signature")?;
    let config = RpcTransactionConfig {
        encoding: Some(UiTransactionEncoding::Json),
        commitment: Some(CommitmentConfig::confirmed()),
        max_supported_transaction_version: Some(0),
    };

    let encoded = client
        .get_transaction_with_config(&signature, config)
        .with_context(|| format!("failed to fetch transaction {signature}"))?;
    convert_transaction(encoded)
}

/// Most recent signatures touching `address`, newest first.
pub fn recent_signatures(rpc_url: &str, address: &str, limit: usize) -> Result<Vec<String>> {
    let client = RpcClient::new(rpc_url.to_string());
    let address = Pubkey::from_str(address).context("invalid address")?;
    let config = GetConfirmedSignaturesForAddress2Config {
        before: None,
        until: None,
        limit: Some(limit),
        commitment: Some(CommitmentConfig::confirmed()),
    };
    let signatures = client
        .get_signatures_for_address_with_config(&address, config)
        .with_context(|| format!("failed to list signatures for {address}"))?;
    Ok(signatures
        .into_iter()
        .filter(|sig| sig.err.is_none())
        .map(|sig| sig.signature)
        .collect())
}

pub fn convert_transaction(tx: EncodedConfirmedTransactionWithStatusMeta) -> Result<RawTransaction> {
    let meta = tx
        .transaction
        .meta
        .as_ref()
        .context("transaction missing status meta")?;
    let (signature, account_keys, instructions) = extract_message(&tx.transaction.transaction, meta)?;

    let inner_instructions =
        convert_inner_instructions(meta.inner_instructions.as_ref().into(), &account_keys);
    let log_messages = Option::<&Vec<String>>::from(meta.log_messages.as_ref())
        .cloned()
        .unwrap_or_default();

    Ok(RawTransaction {
        signature,
        slot: tx.slot,
        block_time: tx.block_time.unwrap_or_default(),
        instructions,
        inner_instructions,
        pre_token_balances: convert_token_balances(meta.pre_token_balances.as_ref().into()),
        post_token_balances: convert_token_balances(meta.post_token_balances.as_ref().into()),
        log_messages,
        failed: meta.err.is_some(),
        account_keys,
    })
}

fn extract_message(
    encoded: &EncodedTransaction,
    meta: &UiTransactionStatusMeta,
) -> Result<(String, Vec<String>, Vec<CompiledInstruction>)> {
    let ui_tx = match encoded {
        EncodedTransaction::Json(tx) => tx,
        _ => return Err(anyhow!("expected JSON encoded transaction")),
    };
    let signature = ui_tx
        .signatures
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("transaction missing signature"))?;

    match &ui_tx.message {
        UiMessage::Raw(raw) => {
            let mut account_keys = raw.account_keys.clone();
            append_loaded_addresses(&mut account_keys, meta);
            let instructions = raw
                .instructions
                .iter()
                .map(convert_compiled_instruction)
                .collect::<Result<Vec<_>>>()?;
            Ok((signature, account_keys, instructions))
        }
        UiMessage::Parsed(parsed) => {
            let mut account_keys: Vec<String> = parsed
                .account_keys
                .iter()
                .map(|account| account.pubkey.clone())
                .collect();
            append_loaded_addresses(&mut account_keys, meta);
            let instructions = parsed
                .instructions
                .iter()
                .filter_map(|ix| convert_ui_instruction(ix, &account_keys))
                .collect();
            Ok((signature, account_keys, instructions))
        }
    }
}

fn append_loaded_addresses(keys: &mut Vec<String>, meta: &UiTransactionStatusMeta) {
    if let Some(loaded) = Option::<&UiLoadedAddresses>::from(meta.loaded_addresses.as_ref()) {
        keys.extend(loaded.writable.iter().cloned());
        keys.extend(loaded.readonly.iter().cloned());
    }
}

fn convert_inner_instructions(
    sets: Option<&Vec<UiInnerInstructions>>,
    account_keys: &[String],
) -> Vec<InnerInstructionGroup> {
    sets.map(|inner_sets| {
        inner_sets
            .iter()
            .map(|set| InnerInstructionGroup {
                index: set.index,
                instructions: set
                    .instructions
                    .iter()
                    .filter_map(|ix| convert_ui_instruction(ix, account_keys))
                    .collect(),
            })
            .collect()
    })
    .unwrap_or_default()
}

fn convert_token_balances(balances: Option<&Vec<UiTransactionTokenBalance>>) -> Vec<TokenBalance> {
    balances
        .map(|items| {
            items
                .iter()
                .map(|balance| TokenBalance {
                    account_index: balance.account_index,
                    mint: balance.mint.clone(),
                    owner: balance.owner.clone().into(),
                    amount: balance.ui_token_amount.amount.clone(),
                    decimals: balance.ui_token_amount.decimals,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// JSON-encoded RPC payloads carry base58 instruction data.
pub fn base58_to_base64(data: &str) -> Result<String> {
    let bytes = bs58::decode(data)
        .into_vec()
        .with_context(|| format!("invalid base58 instruction data {data}"))?;
    Ok(STANDARD.encode(bytes))
}

fn convert_compiled_instruction(instruction: &UiCompiledInstruction) -> Result<CompiledInstruction> {
    Ok(CompiledInstruction {
        program_id_index: instruction.program_id_index,
        accounts: instruction.accounts.clone(),
        data: base58_to_base64(&instruction.data)?,
    })
}

/// Parsed instructions are re-indexed against the account key list; fully
/// parsed ones carry no raw data and are dropped.
fn convert_ui_instruction(
    instruction: &UiInstruction,
    account_keys: &[String],
) -> Option<CompiledInstruction> {
    let index_of = |key: &str| {
        account_keys
            .iter()
            .position(|candidate| candidate == key)
            .and_then(|idx| u8::try_from(idx).ok())
    };

    match instruction {
        UiInstruction::Compiled(compiled) => match convert_compiled_instruction(compiled) {
            Ok(ix) => Some(ix),
            Err(err) => {
                tracing::warn!("dropping inner instruction: {err:#}");
                None
            }
        },
        UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(partial)) => {
            let program_id_index = index_of(&partial.program_id)?;
            let accounts = partial
                .accounts
                .iter()
                .map(|key| index_of(key))
                .collect::<Option<Vec<_>>>()?;
            Some(CompiledInstruction {
                program_id_index,
                accounts,
                data: base58_to_base64(&partial.data).ok()?,
            })
        }
        UiInstruction::Parsed(UiParsedInstruction::Parsed(_)) => None,
    }
}
