//! Lending pool port.
//!
//! Mirrors the four raw operations of an Aave-style pool. The vault never
//! reaches into pool internals; it only moves its own position through these
//! calls and reads the resulting balances back.

use alloy_primitives::{Address, U256};

use crate::error::Result;

/// Lending pool holding the vault's collateral and debt.
///
/// Every mutating method receives the `caller` address (the account whose
/// tokens move) explicitly. Implementations run each call as one atomic
/// frame.
pub trait LendingPool: Send + Sync {
    /// Address tokens are approved to and paid into.
    fn address(&self) -> Address;

    /// Pull `amount` of `token` from `caller` and credit it as collateral of
    /// `on_behalf_of`.
    fn supply(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<()>;

    /// Open `amount` of `token` debt for `on_behalf_of` and send the tokens to
    /// `caller`.
    ///
    /// # Errors
    ///
    /// Fails when the pool lacks liquidity or the borrow breaks the
    /// loan-to-value limit.
    fn borrow(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<()>;

    /// Pull up to `amount` of `token` from `caller` and reduce the debt of
    /// `on_behalf_of`. Returns the amount actually repaid.
    fn repay(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<U256>;

    /// Reduce `caller`'s collateral by `amount` and send the tokens to `to`.
    fn withdraw(&self, caller: Address, token: Address, amount: U256, to: Address) -> Result<()>;

    /// Collateral of `token` supplied by `account`.
    fn supplied_balance(&self, token: Address, account: Address) -> U256;

    /// Debt of `token` owed by `account`.
    fn borrowed_balance(&self, token: Address, account: Address) -> U256;
}
