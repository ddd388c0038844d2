pub mod error;
pub mod v1;
pub mod v2;

pub use error::DecodeError;
