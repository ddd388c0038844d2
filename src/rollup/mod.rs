//! Multi-resolution kline aggregation.

pub mod bucket;
pub mod engine;
pub mod resolution;

pub use bucket::{BucketKey, KlineBucket, Observation, PoolTotals};
pub use engine::{RollupEngine, RollupError};
pub use resolution::Resolution;
