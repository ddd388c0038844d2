use thiserror::Error;

use crate::protocols::error::DecodeError;
use crate::rollup::RollupError;
use crate::store::StoreError;

/// How the driver reacts to an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Log and move on; the cursor still advances.
    Skippable,
    /// Transient I/O; retry the whole page with the cursor untouched.
    Retryable,
    /// The transaction's effects are rolled back and the pool stalls until it succeeds.
    Fatal,
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("fetching transactions failed: {0}")]
    Fetch(#[source] StoreError),
    #[error("storage unavailable: {0}")]
    Storage(#[source] StoreError),
    #[error("rollup failed for tx {tx_id}: {source}")]
    Rollup {
        tx_id: u64,
        #[source]
        source: RollupError,
    },
    #[error("commit failed for tx {tx_id}: {source}")]
    Commit {
        tx_id: u64,
        #[source]
        source: StoreError,
    },
    #[error("tx {tx_id} at slot {slot} would move the cursor past unapplied tx {lower_id}")]
    OutOfOrder { tx_id: u64, slot: u64, lower_id: u64 },
}

impl IndexerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IndexerError::Decode(_) => ErrorClass::Skippable,
            IndexerError::Fetch(_) | IndexerError::Storage(_) => ErrorClass::Retryable,
            IndexerError::Rollup { .. }
            | IndexerError::Commit { .. }
            | IndexerError::OutOfOrder { .. } => ErrorClass::Fatal,
        }
    }

    pub fn rollup(tx_id: u64, source: RollupError) -> Self {
        Self::Rollup { tx_id, source }
    }

    pub fn commit(tx_id: u64, source: StoreError) -> Self {
        Self::Commit { tx_id, source }
    }
}
