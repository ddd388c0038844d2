//! Indexer for a concentrated-liquidity DEX: decodes both on-chain encodings
//! into canonical records and rolls them up into multi-resolution klines.

pub mod config;
pub mod core;
pub mod driver;
pub mod protocols;
pub mod records;
pub mod rollup;
pub mod rpc;
pub mod store;
pub mod types;

pub use crate::config::IndexerConfig;
pub use crate::core::error::{ErrorClass, IndexerError};
pub use crate::core::pool_registry::{PoolLookup, PoolRegistry, PoolSnapshot};
pub use crate::protocols::v1::{InstructionDecoder, V1Count, V1Kind};
pub use crate::protocols::v2::{DecodedEvent, EventDecoder, ProgramEvent};
pub use crate::records::RecordBuilder;
pub use crate::rollup::{KlineBucket, PoolTotals, Resolution, RollupEngine};
pub use crate::types::{
    CanonicalRecord, CollectRecord, Direction, LiquidityKind, LiquidityRecord, PoolConfig,
    ProtocolVersion, RawTransaction, StoredTransaction, SwapRecord, TxMeta,
};
