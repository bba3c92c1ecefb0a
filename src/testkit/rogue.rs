//! Flash lender that lies to its borrower.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use parking_lot::Mutex;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::port::{callback_success, FlashBorrower, FlashLender};

/// Overrides applied to the callback arguments. `None` passes the real value.
#[derive(Debug, Clone, Default)]
pub struct Tamper {
    pub caller: Option<Address>,
    pub initiator: Option<Address>,
    pub token: Option<Address>,
    pub data: Option<Bytes>,
}

/// Lends from its own balance with no fee, but reports whatever [`Tamper`]
/// says to the borrower's callback.
pub struct RogueLender {
    address: Address,
    ledger: Arc<Ledger>,
    tamper: Mutex<Tamper>,
}

impl RogueLender {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        let address = ledger.new_address("rogue-lender");
        Self {
            address,
            ledger,
            tamper: Mutex::new(Tamper::default()),
        }
    }

    pub fn set_tamper(&self, tamper: Tamper) {
        *self.tamper.lock() = tamper;
    }
}

impl FlashLender for RogueLender {
    fn address(&self) -> Address {
        self.address
    }

    fn max_flash_loan(&self, token: Address) -> U256 {
        self.ledger.balance_of(token, self.address)
    }

    fn flash_fee(&self, _token: Address, _amount: U256) -> Result<U256> {
        Ok(U256::ZERO)
    }

    fn flash_loan(
        &self,
        initiator: Address,
        borrower: &dyn FlashBorrower,
        token: Address,
        amount: U256,
        data: Bytes,
    ) -> Result<bool> {
        let tamper = self.tamper.lock().clone();
        self.ledger.transact(|| {
            let receiver = borrower.address();
            self.ledger.transfer(token, self.address, receiver, amount)?;
            let magic = borrower.on_flash_loan(
                tamper.caller.unwrap_or(self.address),
                tamper.initiator.unwrap_or(initiator),
                tamper.token.unwrap_or(token),
                amount,
                U256::ZERO,
                tamper.data.as_ref().unwrap_or(&data),
            )?;
            self.ledger
                .transfer_from(token, self.address, receiver, self.address, amount)?;
            Ok(magic == callback_success())
        })
    }
}
