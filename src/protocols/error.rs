use thiserror::Error;

use crate::core::binary_reader::BinaryReaderError;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("binary reader error: {0}")]
    BinaryReader(#[from] BinaryReaderError),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("instruction data too short: need {need} bytes, got {got}")]
    ShortData { need: usize, got: usize },
    #[error("missing account {account} at position {position}")]
    MissingAccount {
        account: &'static str,
        position: usize,
    },
    #[error("account index {0} is outside the account key list")]
    AccountIndex(u8),
    #[error("vault {vault} does not belong to pool {pool}")]
    VaultMismatch { pool: String, vault: String },
    #[error("missing settlement transfer: {0}")]
    MissingTransfer(&'static str),
}

impl DecodeError {
    pub fn missing_account(account: &'static str, position: usize) -> Self {
        Self::MissingAccount { account, position }
    }

    pub fn short_data(need: usize, got: usize) -> Self {
        Self::ShortData { need, got }
    }
}
