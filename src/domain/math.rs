//! Pure leverage, valuation and rebalance conversions.
//!
//! All amounts are `U256` in token base units; valuations are in the oracle's
//! base currency. Every function is total: overflow and division by zero come
//! back as [`MathError`] instead of panicking.

use alloy_primitives::U256;
use thiserror::Error;

/// 100% expressed in basis points.
pub const ONE_HUNDRED_PERCENT_BPS: u32 = 10_000;

/// Arithmetic failures surfaced by the conversion helpers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,
}

type MathResult<T> = Result<T, MathError>;

fn bps(value: u32) -> U256 {
    U256::from(value)
}

/// `a * b / d`, rounded down.
pub fn mul_div(a: U256, b: U256, d: U256) -> MathResult<U256> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / d)
}

/// `a * b / d`, rounded up.
pub fn mul_div_up(a: U256, b: U256, d: U256) -> MathResult<U256> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    let quotient = product / d;
    if (product % d).is_zero() {
        Ok(quotient)
    } else {
        quotient.checked_add(U256::from(1u8)).ok_or(MathError::Overflow)
    }
}

/// `10^decimals`.
pub fn unit(decimals: u8) -> MathResult<U256> {
    U256::from(10u8)
        .checked_pow(U256::from(decimals))
        .ok_or(MathError::Overflow)
}

/// Value of `amount` token units in base currency.
pub fn to_base(amount: U256, price: U256, decimals: u8) -> MathResult<U256> {
    mul_div(amount, price, unit(decimals)?)
}

/// Token units worth `base` in base currency, rounded down.
pub fn from_base(base: U256, price: U256, decimals: u8) -> MathResult<U256> {
    mul_div(base, unit(decimals)?, price)
}

/// Token units worth `base` in base currency, rounded up.
pub fn from_base_up(base: U256, price: U256, decimals: u8) -> MathResult<U256> {
    mul_div_up(base, unit(decimals)?, price)
}

/// Price and decimals of one side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: U256,
    pub decimals: u8,
}

impl Quote {
    pub fn new(price: U256, decimals: u8) -> Self {
        Self { price, decimals }
    }
}

/// Convert `amount` of `from` into the value-equivalent amount of `to`, rounded down.
pub fn convert(amount: U256, from: Quote, to: Quote) -> MathResult<U256> {
    // Single division keeps the rounding error to one unit of `to`.
    let numerator = amount
        .checked_mul(from.price)
        .and_then(|v| v.checked_mul(unit(to.decimals).ok()?))
        .ok_or(MathError::Overflow)?;
    let denominator = to
        .price
        .checked_mul(unit(from.decimals)?)
        .ok_or(MathError::Overflow)?;
    mul_div(numerator, U256::from(1u8), denominator)
}

/// Convert `amount` of `from` into `to`, rounded up.
pub fn convert_up(amount: U256, from: Quote, to: Quote) -> MathResult<U256> {
    let numerator = amount
        .checked_mul(from.price)
        .and_then(|v| v.checked_mul(unit(to.decimals).ok()?))
        .ok_or(MathError::Overflow)?;
    let denominator = to
        .price
        .checked_mul(unit(from.decimals)?)
        .ok_or(MathError::Overflow)?;
    mul_div_up(numerator, U256::from(1u8), denominator)
}

/// `C·10000 / (C − D)`; zero when undefined (no collateral, or debt ≥ collateral).
pub fn leverage_bps(collateral_base: U256, debt_base: U256) -> u64 {
    if collateral_base.is_zero() || debt_base >= collateral_base {
        return 0;
    }
    let net = collateral_base - debt_base;
    match mul_div(collateral_base, bps(ONE_HUNDRED_PERCENT_BPS), net) {
        Ok(value) => u64::try_from(value).unwrap_or(u64::MAX),
        Err(_) => u64::MAX,
    }
}

/// Gross collateral backing `unleveraged` net units at `leverage_bps`.
pub fn leveraged_assets(unleveraged: U256, leverage_bps: u64) -> MathResult<U256> {
    mul_div(
        unleveraged,
        U256::from(leverage_bps),
        bps(ONE_HUNDRED_PERCENT_BPS),
    )
}

/// Net units represented by `leveraged` gross collateral at `leverage_bps`.
pub fn unleveraged_assets(leveraged: U256, leverage_bps: u64) -> MathResult<U256> {
    mul_div(
        leveraged,
        bps(ONE_HUNDRED_PERCENT_BPS),
        U256::from(leverage_bps),
    )
}

/// Debt amount whose value is the debt-financed slice `(L − 10000) / L` of
/// `collateral_amount`. Used both for the borrow on deposit and the repay on
/// redemption; either way leverage stays where it was.
pub fn debt_keeping_leverage(
    collateral_amount: U256,
    leverage_bps: u64,
    collateral: Quote,
    debt: Quote,
) -> MathResult<U256> {
    if leverage_bps <= u64::from(ONE_HUNDRED_PERCENT_BPS) {
        return Ok(U256::ZERO);
    }
    let leverage = U256::from(leverage_bps);
    let collateral_base = to_base(collateral_amount, collateral.price, collateral.decimals)?;
    let debt_base = mul_div(
        collateral_base,
        leverage - bps(ONE_HUNDRED_PERCENT_BPS),
        leverage,
    )?;
    from_base(debt_base, debt.price, debt.decimals)
}

/// `amount · bps / 10000`, rounded down.
pub fn apply_bps(amount: U256, value_bps: u32) -> MathResult<U256> {
    mul_div(amount, bps(value_bps), bps(ONE_HUNDRED_PERCENT_BPS))
}

/// `amount · (10000 + bps) / 10000`, rounded up. Used for slippage ceilings.
pub fn add_bps_up(amount: U256, value_bps: u32) -> MathResult<U256> {
    let factor = bps(ONE_HUNDRED_PERCENT_BPS)
        .checked_add(bps(value_bps))
        .ok_or(MathError::Overflow)?;
    mul_div_up(amount, factor, bps(ONE_HUNDRED_PERCENT_BPS))
}

/// `amount · (10000 − bps) / 10000`, rounded down. Saturates at zero for bps ≥ 100%.
pub fn sub_bps(amount: U256, value_bps: u32) -> MathResult<U256> {
    let factor = bps(ONE_HUNDRED_PERCENT_BPS).saturating_sub(bps(value_bps));
    mul_div(amount, factor, bps(ONE_HUNDRED_PERCENT_BPS))
}

/// Whether `current` lies inside `[lower, upper]`.
pub fn within_bounds(current: u64, lower: u32, upper: u32) -> bool {
    current >= u64::from(lower) && current <= u64::from(upper)
}

/// Rebalance subsidy: relative deviation from target, capped at `max_subsidy_bps`.
pub fn subsidy_bps(current: u64, target: u32, max_subsidy_bps: u32) -> u32 {
    if target == 0 {
        return 0;
    }
    let deviation = current.abs_diff(u64::from(target));
    let relative = deviation.saturating_mul(u64::from(ONE_HUNDRED_PERCENT_BPS)) / u64::from(target);
    u32::try_from(relative)
        .unwrap_or(u32::MAX)
        .min(max_subsidy_bps)
}

/// Collateral value (base) to supply so that, after borrowing
/// `value · (1 + subsidy)` of debt, leverage lands exactly on `target`.
///
/// Solves `(C + X)·10⁴ = T·(C − D − X·s/10⁴)`. Zero when leverage is already
/// at or above target.
pub fn increase_to_target(
    collateral_base: U256,
    debt_base: U256,
    target: u32,
    subsidy: u32,
) -> MathResult<U256> {
    let hundred = bps(ONE_HUNDRED_PERCENT_BPS);
    let hundred_sq = hundred * hundred;
    let target = bps(target);
    let net = collateral_base.saturating_sub(debt_base);

    let lhs = target
        .checked_mul(hundred)
        .and_then(|v| v.checked_mul(net))
        .ok_or(MathError::Overflow)?;
    let rhs = hundred_sq
        .checked_mul(collateral_base)
        .ok_or(MathError::Overflow)?;
    if lhs <= rhs {
        return Ok(U256::ZERO);
    }
    let denominator = hundred_sq
        .checked_add(target.checked_mul(bps(subsidy)).ok_or(MathError::Overflow)?)
        .ok_or(MathError::Overflow)?;
    mul_div(lhs - rhs, U256::from(1u8), denominator)
}

/// Debt value (base) to repay so that, after withdrawing
/// `value · (1 + subsidy)` of collateral, leverage lands exactly on `target`.
///
/// Solves `(C − Y·(1 + s/10⁴))·10⁴ = T·(C − D − Y·s/10⁴)`. Zero when leverage
/// is already at or below target.
pub fn decrease_to_target(
    collateral_base: U256,
    debt_base: U256,
    target: u32,
    subsidy: u32,
) -> MathResult<U256> {
    let hundred = bps(ONE_HUNDRED_PERCENT_BPS);
    let hundred_sq = hundred * hundred;
    let target = bps(target);
    let subsidy = bps(subsidy);
    let net = collateral_base.saturating_sub(debt_base);

    let lhs = hundred_sq
        .checked_mul(collateral_base)
        .ok_or(MathError::Overflow)?;
    let rhs = hundred
        .checked_mul(target)
        .and_then(|v| v.checked_mul(net))
        .ok_or(MathError::Overflow)?;
    if lhs <= rhs {
        return Ok(U256::ZERO);
    }
    // 10⁸ + s·10⁴ − T·s, which is positive while s·(T − 10⁴) < 10⁸.
    let positive = hundred_sq
        .checked_add(subsidy.checked_mul(hundred).ok_or(MathError::Overflow)?)
        .ok_or(MathError::Overflow)?;
    let negative = target.checked_mul(subsidy).ok_or(MathError::Overflow)?;
    if positive <= negative {
        return Err(MathError::DivisionByZero);
    }
    mul_div(lhs - rhs, U256::from(1u8), positive - negative)
}
