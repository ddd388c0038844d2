//! Combines settlement transfers with vault balance snapshots.

use serde::Serialize;

use crate::protocols::error::DecodeError;
use crate::types::RawTransaction;

/// Pre/post token balance of one vault account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSnapshot {
    pub pre: Option<u64>,
    pub post: Option<u64>,
}

impl VaultSnapshot {
    pub fn from_tx(tx: &RawTransaction, account_index: u8) -> Self {
        Self {
            pre: tx
                .pre_balance(account_index)
                .and_then(|b| b.raw_amount()),
            post: tx
                .post_balance(account_index)
                .and_then(|b| b.raw_amount()),
        }
    }

    pub fn delta(&self) -> Option<i128> {
        match (self.pre, self.post) {
            (Some(pre), Some(post)) => Some(i128::from(post) - i128::from(pre)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub amount_a: u64,
    pub amount_b: u64,
    pub balance_a: Option<u64>,
    pub balance_b: Option<u64>,
    pub delta_a: Option<i128>,
    pub delta_b: Option<i128>,
}

/// Transfer payloads win; a missing transfer falls back to the vault's |post - pre|.
pub fn reconcile(
    transfer_a: Option<u64>,
    transfer_b: Option<u64>,
    vault_a: VaultSnapshot,
    vault_b: VaultSnapshot,
) -> Result<Settlement, DecodeError> {
    let amount_a = settle_side(transfer_a, &vault_a, "token A")?;
    let amount_b = settle_side(transfer_b, &vault_b, "token B")?;

    Ok(Settlement {
        amount_a,
        amount_b,
        balance_a: vault_a.post,
        balance_b: vault_b.post,
        delta_a: vault_a.delta(),
        delta_b: vault_b.delta(),
    })
}

fn settle_side(
    transfer: Option<u64>,
    vault: &VaultSnapshot,
    side: &'static str,
) -> Result<u64, DecodeError> {
    let from_delta = vault
        .delta()
        .and_then(|d| u64::try_from(d.unsigned_abs()).ok());

    match (transfer, from_delta) {
        (Some(amount), Some(delta)) => {
            if amount != delta {
                // Other instructions in the same transaction may also move the vault.
                tracing::debug!(side, amount, delta, "transfer differs from vault delta");
            }
            Ok(amount)
        }
        (Some(amount), None) => Ok(amount),
        (None, Some(delta)) => Ok(delta),
        (None, None) => Err(DecodeError::MissingTransfer(side)),
    }
}
