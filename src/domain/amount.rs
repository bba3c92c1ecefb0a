//! Conversions between token base units and human-readable decimals.

use alloy_primitives::U256;
use rust_decimal::Decimal;

use super::math::unit;

/// Largest scale a [`Decimal`] can carry.
const MAX_SCALE: u8 = 28;

/// Render base units as a decimal number of whole tokens.
///
/// Values beyond `Decimal` range saturate at [`Decimal::MAX`].
pub fn format_units(amount: U256, decimals: u8) -> Decimal {
    let (amount, scale) = if decimals > MAX_SCALE {
        let divisor = unit(decimals - MAX_SCALE).unwrap_or(U256::MAX);
        (amount / divisor, MAX_SCALE)
    } else {
        (amount, decimals)
    };

    let Ok(mantissa) = i128::try_from(amount) else {
        return Decimal::MAX;
    };
    Decimal::try_from_i128_with_scale(mantissa, u32::from(scale))
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

/// Convert a decimal number of whole tokens into base units, truncating
/// precision finer than `decimals`. Returns `None` for negative or
/// unrepresentable values.
pub fn parse_units(amount: Decimal, decimals: u8) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let mantissa = U256::from(u128::try_from(amount.mantissa()).ok()?);
    let scale = u8::try_from(amount.scale()).ok()?;
    if decimals >= scale {
        mantissa.checked_mul(unit(decimals - scale).ok()?)
    } else {
        Some(mantissa / unit(scale - decimals).ok()?)
    }
}
