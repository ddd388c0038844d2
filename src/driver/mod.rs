//! Per-pool sync loop: fetch, decode, roll up, advance cursor, commit.

pub mod scheduler;
pub mod worker;

pub use scheduler::{run_pool_loop, run_pool_refresh};
pub use worker::{CycleReport, PoolWorker, SharedContext, TxOutcome, WorkerSettings};
