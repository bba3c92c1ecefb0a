//! Flash loan port (ERC-3156 shape).

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

use crate::error::Result;

/// Value a borrower must return from [`FlashBorrower::on_flash_loan`] for the
/// loan to proceed: `keccak256("ERC3156FlashBorrower.onFlashLoan")`.
pub fn callback_success() -> B256 {
    keccak256("ERC3156FlashBorrower.onFlashLoan")
}

/// Lender of uncollateralized, same-call loans.
pub trait FlashLender: Send + Sync {
    /// Address the borrower must approve for repayment.
    fn address(&self) -> Address;

    /// Largest loan of `token` currently available; zero if unsupported.
    fn max_flash_loan(&self, token: Address) -> U256;

    /// Fee charged on a loan of `amount` of `token`.
    fn flash_fee(&self, token: Address, amount: U256) -> Result<U256>;

    /// Lend `amount` of `token` to `borrower`, invoke its callback with
    /// `data`, then pull back `amount + fee`.
    ///
    /// `initiator` is the account that requested the loan and is forwarded to
    /// the callback untouched. The whole sequence is one atomic frame: if the
    /// callback fails, returns anything but [`callback_success`], or the
    /// repayment cannot be pulled, every change is rolled back.
    fn flash_loan(
        &self,
        initiator: Address,
        borrower: &dyn FlashBorrower,
        token: Address,
        amount: U256,
        data: Bytes,
    ) -> Result<bool>;
}

/// Receiver of a flash loan.
pub trait FlashBorrower: Send + Sync {
    /// Address the loaned tokens are sent to.
    fn address(&self) -> Address;

    /// Called by the lender after the loan is transferred. `caller` is the
    /// lender's own address.
    fn on_flash_loan(
        &self,
        caller: Address,
        initiator: Address,
        token: Address,
        amount: U256,
        fee: U256,
        data: &Bytes,
    ) -> Result<B256>;
}
