//! Trading venue port.

use alloy_primitives::{Address, Bytes};

use crate::error::Result;

/// Opaque trading venue (router) driven by calldata assembled off-chain.
///
/// Nothing about the payload is trusted: the venue may pull any amount the
/// caller approved and may deliver any amount to any account. The only
/// guarantee callers rely on is the balance-delta check performed by
/// [`crate::settlement::SwapSettlement`].
pub trait Venue: Send + Sync {
    /// Address the caller approves input tokens to.
    fn address(&self) -> Address;

    /// Execute `payload` on behalf of `caller`.
    fn call(&self, caller: Address, payload: &Bytes) -> Result<Bytes>;
}
