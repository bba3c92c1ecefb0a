//! Token metadata.

use std::fmt;

use alloy_primitives::Address;
use serde::Serialize;

/// Metadata of a token registered on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Token contract address.
    pub address: Address,
    /// Ticker symbol, display only.
    pub symbol: String,
    /// Number of decimals of one whole token.
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

impl fmt::Display for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.address)
    }
}
