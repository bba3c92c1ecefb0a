//! Swap execution hook port.

use alloy_primitives::{Address, Bytes, U256};

use crate::error::Result;

/// One exact-output swap request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub input_token: Address,
    pub output_token: Address,
    /// Exact amount of `output_token` wanted.
    pub amount_out: U256,
    /// Ceiling on `input_token` spent.
    pub amount_in_maximum: U256,
    /// Account that receives any output above `amount_out`.
    pub receiver: Address,
    /// Opaque venue calldata.
    pub payload: Bytes,
}

/// Venue-specific swap execution, one implementation per venue, bound at
/// construction.
pub trait SwapExecutor: Send + Sync {
    /// Execute `request` for the holder the executor was built for. Returns
    /// the input spent as measured by the executor; settlement does not trust
    /// this value and re-measures it.
    fn execute(&self, request: &SwapRequest) -> Result<U256>;
}
