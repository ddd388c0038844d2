//! Opcode-tagged instructions settled through inner token transfers.

pub mod balance;
pub mod instruction_decoder;

pub use balance::{reconcile, Settlement, VaultSnapshot};
pub use instruction_decoder::{
    liquidity_transfer_start, InstructionDecoder, InstructionLocation, V1Count, V1Kind,
};
