use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rust_decimal::Decimal;

use crate::types::CompiledInstruction;

/// Decodes the base64 payload of a compiled instruction.
pub fn instruction_data(instruction: &CompiledInstruction) -> Result<Vec<u8>, base64::DecodeError> {
    if instruction.data.is_empty() {
        return Ok(Vec::new());
    }
    STANDARD.decode(&instruction.data)
}

/// Raw integer amount scaled down by `decimals`, exact.
pub fn scale_amount(raw: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(raw as i128, u32::from(decimals.min(28)))
}

/// Raw amount parsed from a decimal string, as token balances report it.
pub fn scale_amount_str(raw: &str, decimals: u8) -> Option<Decimal> {
    raw.parse::<u64>().ok().map(|v| scale_amount(v, decimals))
}
