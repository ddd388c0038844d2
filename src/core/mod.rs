pub mod binary_reader;
pub mod constants;
pub mod discriminator;
pub mod error;
pub mod pool_registry;
pub mod price;
pub mod utils;
