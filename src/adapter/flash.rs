//! In-memory ERC-3156 flash lender.

use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::math;
use crate::domain::ONE_HUNDRED_PERCENT_BPS;
use crate::error::{FlashLoanError, Result};
use crate::ledger::Ledger;
use crate::port::{callback_success, FlashBorrower, FlashLender};

/// Lends its own ledger balance of each supported token for a flat fee.
pub struct InMemoryFlashLender {
    address: Address,
    ledger: Arc<Ledger>,
    fee_bps: u32,
    supported: Mutex<HashSet<Address>>,
}

impl InMemoryFlashLender {
    pub fn new(ledger: Arc<Ledger>, fee_bps: u32) -> Self {
        let address = ledger.new_address("flash-lender");
        Self {
            address,
            ledger,
            fee_bps,
            supported: Mutex::new(HashSet::new()),
        }
    }

    pub fn support(&self, token: Address) {
        self.supported.lock().insert(token);
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    fn ensure_supported(&self, token: Address) -> Result<()> {
        if self.supported.lock().contains(&token) {
            Ok(())
        } else {
            Err(FlashLoanError::UnsupportedToken { token }.into())
        }
    }
}

impl FlashLender for InMemoryFlashLender {
    fn address(&self) -> Address {
        self.address
    }

    fn max_flash_loan(&self, token: Address) -> U256 {
        if self.ensure_supported(token).is_err() {
            return U256::ZERO;
        }
        self.ledger.balance_of(token, self.address)
    }

    fn flash_fee(&self, token: Address, amount: U256) -> Result<U256> {
        self.ensure_supported(token)?;
        Ok(math::mul_div_up(
            amount,
            U256::from(self.fee_bps),
            U256::from(ONE_HUNDRED_PERCENT_BPS),
        )?)
    }

    fn flash_loan(
        &self,
        initiator: Address,
        borrower: &dyn FlashBorrower,
        token: Address,
        amount: U256,
        data: Bytes,
    ) -> Result<bool> {
        let available = self.max_flash_loan(token);
        let fee = self.flash_fee(token, amount)?;
        if amount > available {
            return Err(FlashLoanError::ExceedsMaxFlashLoan {
                requested: amount,
                available,
            }
            .into());
        }

        self.ledger.transact(|| {
            let receiver = borrower.address();
            let balance_before = self.ledger.balance_of(token, self.address);
            self.ledger.transfer(token, self.address, receiver, amount)?;
            debug!(%token, %receiver, %initiator, %amount, %fee, "Flash loan issued");

            let result =
                borrower.on_flash_loan(self.address, initiator, token, amount, fee, &data)?;
            if result != callback_success() {
                warn!(%receiver, "Flash borrower returned wrong magic value");
                return Err(FlashLoanError::CallbackFailed.into());
            }

            let owed = amount + fee;
            self.ledger
                .transfer_from(token, self.address, receiver, self.address, owed)?;
            let balance_after = self.ledger.balance_of(token, self.address);
            let expected = balance_before + fee;
            if balance_after < expected {
                return Err(FlashLoanError::NotRepaid {
                    actual: balance_after,
                    expected,
                }
                .into());
            }
            info!(%token, %receiver, %amount, %fee, "Flash loan repaid");
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TokenError};
    use alloy_primitives::B256;

    /// Borrower that approves `repay` back to the lender and returns `magic`.
    struct TestBorrower {
        address: Address,
        ledger: Arc<Ledger>,
        repay: U256,
        magic: B256,
    }

    impl FlashBorrower for TestBorrower {
        fn address(&self) -> Address {
            self.address
        }

        fn on_flash_loan(
            &self,
            caller: Address,
            _initiator: Address,
            token: Address,
            _amount: U256,
            _fee: U256,
            _data: &Bytes,
        ) -> Result<B256> {
            self.ledger.approve(token, self.address, caller, self.repay)?;
            Ok(self.magic)
        }
    }

    fn setup(repay: u64, magic: B256) -> (Arc<Ledger>, InMemoryFlashLender, TestBorrower, Address) {
        let ledger = Arc::new(Ledger::new());
        let token = ledger.create_token("USDC", 6).unwrap();
        let lender = InMemoryFlashLender::new(ledger.clone(), 9);
        lender.support(token);
        ledger.mint(token, lender.address(), U256::from(1_000_000u64)).unwrap();
        let borrower = TestBorrower {
            address: ledger.new_address("borrower"),
            ledger: ledger.clone(),
            repay: U256::from(repay),
            magic,
        };
        ledger.mint(token, borrower.address, U256::from(1_000u64)).unwrap();
        (ledger, lender, borrower, token)
    }

    #[test]
    fn loan_is_repaid_with_fee() {
        let (ledger, lender, borrower, token) = setup(100_090, callback_success());
        assert_eq!(lender.flash_fee(token, U256::from(100_000u64)).unwrap(), U256::from(90u64));
        let ok = lender
            .flash_loan(borrower.address, &borrower, token, U256::from(100_000u64), Bytes::new())
            .unwrap();
        assert!(ok);
        assert_eq!(ledger.balance_of(token, lender.address()), U256::from(1_000_090u64));
        assert_eq!(ledger.balance_of(token, borrower.address), U256::from(910u64));
    }

    #[test]
    fn wrong_magic_value_reverts() {
        let (ledger, lender, borrower, token) = setup(100_090, B256::ZERO);
        let err = lender
            .flash_loan(borrower.address, &borrower, token, U256::from(100_000u64), Bytes::new())
            .unwrap_err();
        assert_eq!(err, Error::FlashLoan(FlashLoanError::CallbackFailed));
        assert_eq!(ledger.balance_of(token, lender.address()), U256::from(1_000_000u64));
    }

    #[test]
    fn missing_repayment_approval_reverts() {
        let (ledger, lender, borrower, token) = setup(100_000, callback_success());
        let err = lender
            .flash_loan(borrower.address, &borrower, token, U256::from(100_000u64), Bytes::new())
            .unwrap_err();
        assert!(matches!(err, Error::Token(TokenError::InsufficientAllowance { .. })));
        assert_eq!(ledger.balance_of(token, borrower.address), U256::from(1_000u64));
    }

    #[test]
    fn limits_and_support_are_enforced() {
        let (ledger, lender, borrower, token) = setup(0, callback_success());
        let err = lender
            .flash_loan(borrower.address, &borrower, token, U256::from(1_000_001u64), Bytes::new())
            .unwrap_err();
        assert!(matches!(err, Error::FlashLoan(FlashLoanError::ExceedsMaxFlashLoan { .. })));

        let other = ledger.create_token("DAI", 18).unwrap();
        assert_eq!(lender.max_flash_loan(other), U256::ZERO);
        assert_eq!(
            lender.flash_fee(other, U256::from(1u8)).unwrap_err(),
            Error::FlashLoan(FlashLoanError::UnsupportedToken { token: other })
        );
    }
}
