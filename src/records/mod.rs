//! Version-agnostic canonical records built from either decoder.

pub mod builder;

pub use builder::{swap_price, v1_swap_fee, RecordBuilder};
