//! Price oracle port.

use alloy_primitives::{Address, U256};

use crate::error::Result;

/// Decimals of every price returned by a [`PriceOracle`].
pub const PRICE_DECIMALS: u8 = 8;

/// Source of asset prices in a common base currency.
///
/// Implementations must reject prices they cannot vouch for (missing, zero or
/// stale) with an error rather than returning them.
pub trait PriceOracle: Send + Sync {
    /// Price of one whole `token` in base currency with [`PRICE_DECIMALS`]
    /// decimals.
    fn asset_price(&self, token: Address) -> Result<U256>;
}
