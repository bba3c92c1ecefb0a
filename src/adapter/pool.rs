//! In-memory Aave-style lending pool.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::math;
use crate::domain::ONE_HUNDRED_PERCENT_BPS;
use crate::error::{ConfigError, PoolError, Result, TokenError};
use crate::ledger::Ledger;
use crate::port::{LendingPool, PriceOracle};

#[derive(Debug, Clone, Copy)]
struct Reserve {
    supply_token: Address,
    debt_token: Address,
    ltv_bps: u32,
}

/// Lending pool tracking positions as supply and debt receipt tokens on the
/// shared ledger. Liquidity is the pool's own balance of each reserve.
pub struct InMemoryLendingPool {
    address: Address,
    ledger: Arc<Ledger>,
    oracle: Arc<dyn PriceOracle>,
    reserves: Mutex<HashMap<Address, Reserve>>,
}

impl InMemoryLendingPool {
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<dyn PriceOracle>) -> Self {
        let address = ledger.new_address("pool");
        Self {
            address,
            ledger,
            oracle,
            reserves: Mutex::new(HashMap::new()),
        }
    }

    /// List `token` as a reserve whose collateral counts `ltv_bps` toward
    /// borrowing power.
    pub fn list_reserve(&self, token: Address, ltv_bps: u32) -> Result<()> {
        if ltv_bps > ONE_HUNDRED_PERCENT_BPS {
            return Err(ConfigError::InvalidValue {
                field: "pool.ltv_bps",
                reason: format!("{ltv_bps} exceeds 100%"),
            }
            .into());
        }
        let info = self.ledger.token(token)?;
        if self.reserves.lock().contains_key(&token) {
            return Err(TokenError::AlreadyRegistered { token }.into());
        }
        let supply_token = self
            .ledger
            .create_token(&format!("a{}", info.symbol), info.decimals)?;
        let debt_token = self
            .ledger
            .create_token(&format!("variableDebt{}", info.symbol), info.decimals)?;
        self.reserves.lock().insert(
            token,
            Reserve {
                supply_token,
                debt_token,
                ltv_bps,
            },
        );
        info!(pool = %self.address, reserve = %info.symbol, ltv_bps, "Listed reserve");
        Ok(())
    }

    /// Underlying held by the pool and free to borrow or withdraw.
    pub fn available_liquidity(&self, token: Address) -> U256 {
        self.ledger.balance_of(token, self.address)
    }

    fn reserve(&self, token: Address) -> Result<Reserve> {
        self.reserves
            .lock()
            .get(&token)
            .copied()
            .ok_or_else(|| PoolError::UnlistedReserve { token }.into())
    }

    /// Borrowing limit and outstanding debt of `account`, in base currency.
    fn account_data(&self, account: Address) -> Result<(U256, U256)> {
        let reserves: Vec<(Address, Reserve)> = self
            .reserves
            .lock()
            .iter()
            .map(|(token, reserve)| (*token, *reserve))
            .collect();

        let mut limit = U256::ZERO;
        let mut debt = U256::ZERO;
        for (token, reserve) in reserves {
            let supplied = self.ledger.balance_of(reserve.supply_token, account);
            let borrowed = self.ledger.balance_of(reserve.debt_token, account);
            if supplied.is_zero() && borrowed.is_zero() {
                continue;
            }
            let price = self.oracle.asset_price(token)?;
            let decimals = self.ledger.token(token)?.decimals;
            let supplied_base = math::to_base(supplied, price, decimals)?;
            limit = limit.saturating_add(math::apply_bps(supplied_base, reserve.ltv_bps)?);
            debt = debt.saturating_add(math::to_base(borrowed, price, decimals)?);
        }
        Ok((limit, debt))
    }

    fn check_ltv(&self, account: Address) -> Result<()> {
        let (limit, debt) = self.account_data(account)?;
        if debt > limit {
            return Err(PoolError::LtvExceeded {
                debt_base: debt,
                limit_base: limit,
            }
            .into());
        }
        Ok(())
    }

    fn check_liquidity(&self, token: Address, requested: U256) -> Result<()> {
        let available = self.available_liquidity(token);
        if available < requested {
            return Err(PoolError::InsufficientLiquidity {
                token,
                available,
                requested,
            }
            .into());
        }
        Ok(())
    }
}

fn non_zero(amount: U256, operation: &'static str) -> Result<()> {
    if amount.is_zero() {
        Err(PoolError::ZeroAmount { operation }.into())
    } else {
        Ok(())
    }
}

impl LendingPool for InMemoryLendingPool {
    fn address(&self) -> Address {
        self.address
    }

    fn supply(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<()> {
        non_zero(amount, "supply")?;
        let reserve = self.reserve(token)?;
        self.ledger.transact(|| {
            self.ledger
                .transfer_from(token, self.address, caller, self.address, amount)?;
            self.ledger.mint(reserve.supply_token, on_behalf_of, amount)?;
            debug!(%token, %caller, %on_behalf_of, %amount, "Pool supply");
            Ok(())
        })
    }

    fn borrow(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<()> {
        non_zero(amount, "borrow")?;
        if caller != on_behalf_of {
            return Err(PoolError::NotDelegated {
                caller,
                on_behalf_of,
            }
            .into());
        }
        let reserve = self.reserve(token)?;
        self.ledger.transact(|| {
            self.check_liquidity(token, amount)?;
            self.ledger.mint(reserve.debt_token, on_behalf_of, amount)?;
            self.check_ltv(on_behalf_of)?;
            self.ledger.transfer(token, self.address, caller, amount)?;
            debug!(%token, %caller, %amount, "Pool borrow");
            Ok(())
        })
    }

    fn repay(&self, caller: Address, token: Address, amount: U256, on_behalf_of: Address) -> Result<U256> {
        non_zero(amount, "repay")?;
        let reserve = self.reserve(token)?;
        self.ledger.transact(|| {
            let owed = self.ledger.balance_of(reserve.debt_token, on_behalf_of);
            let repaid = amount.min(owed);
            if repaid.is_zero() {
                return Ok(U256::ZERO);
            }
            self.ledger
                .transfer_from(token, self.address, caller, self.address, repaid)?;
            self.ledger.burn(reserve.debt_token, on_behalf_of, repaid)?;
            debug!(%token, %caller, %on_behalf_of, %repaid, "Pool repay");
            Ok(repaid)
        })
    }

    fn withdraw(&self, caller: Address, token: Address, amount: U256, to: Address) -> Result<()> {
        non_zero(amount, "withdraw")?;
        let reserve = self.reserve(token)?;
        self.ledger.transact(|| {
            self.check_liquidity(token, amount)?;
            self.ledger.burn(reserve.supply_token, caller, amount)?;
            self.check_ltv(caller)?;
            self.ledger.transfer(token, self.address, to, amount)?;
            debug!(%token, %caller, %to, %amount, "Pool withdraw");
            Ok(())
        })
    }

    fn supplied_balance(&self, token: Address, account: Address) -> U256 {
        self.reserve(token)
            .map(|reserve| self.ledger.balance_of(reserve.supply_token, account))
            .unwrap_or_default()
    }

    fn borrowed_balance(&self, token: Address, account: Address) -> U256 {
        self.reserve(token)
            .map(|reserve| self.ledger.balance_of(reserve.debt_token, account))
            .unwrap_or_default()
    }
}
