//! Default environment plus shorthand for amounts and balances.
//!
//! Amount helpers take whole tokens (or a named fraction) and return base
//! units, so assertions read in the units a person would use.

use std::ops::Deref;

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;

use crate::app::{Asset, Environment, SimulationConfig};
use crate::domain::math::unit;

/// A fresh [`Environment`] built from [`SimulationConfig::default`]:
/// collateral at $1000 with 18 decimals, debt at $1 with 6 decimals, a 3x
/// target inside `[2.5x, 3.5x]` and a 9 bps flash fee.
pub struct Fixture {
    env: Environment,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(&SimulationConfig::default())
    }

    pub fn with_config(config: &SimulationConfig) -> Self {
        let env = Environment::build(config).expect("fixture environment");
        Self { env }
    }

    /// Default environment with both the flash fee and the venue fee at zero.
    pub fn fee_free() -> Self {
        let mut config = SimulationConfig::default();
        config.lender.fee_bps = 0;
        config.venue.fee_bps = 0;
        Self::with_config(&config)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    fn scaled(&self, token: Address, amount: u64, shift: u8) -> U256 {
        let decimals = self.env.ledger.token(token).expect("token").decimals;
        U256::from(amount) * unit(decimals - shift).expect("unit")
    }

    /// `n` whole collateral tokens.
    pub fn collateral(&self, n: u64) -> U256 {
        self.scaled(self.collateral_token(), n, 0)
    }

    /// `n` thousandths of a collateral token.
    pub fn collateral_milli(&self, n: u64) -> U256 {
        self.scaled(self.collateral_token(), n, 3)
    }

    /// `n` whole debt tokens.
    pub fn debt(&self, n: u64) -> U256 {
        self.scaled(self.debt_token(), n, 0)
    }

    /// `n` millionths of a debt token.
    pub fn debt_micro(&self, n: u64) -> U256 {
        self.scaled(self.debt_token(), n, 6)
    }

    /// Named account holding `n` whole collateral tokens.
    pub fn user_with_collateral(&self, name: &str, n: u64) -> Address {
        let user = self.env.account(name);
        self.env
            .ledger
            .mint(self.collateral_token(), user, self.collateral(n))
            .expect("mint collateral");
        user
    }

    /// Deposit `n` collateral straight into the vault from a `seed` account,
    /// giving the vault a position at target leverage.
    pub fn seed_vault(&self, n: u64) -> Address {
        let seed = self.user_with_collateral("seed", n);
        self.approve_collateral(seed, self.env.vault.address(), self.collateral(n));
        self.env
            .vault
            .deposit(seed, self.collateral(n), seed)
            .expect("seed deposit");
        seed
    }

    pub fn collateral_balance(&self, account: Address) -> U256 {
        self.env.ledger.balance_of(self.collateral_token(), account)
    }

    pub fn debt_balance(&self, account: Address) -> U256 {
        self.env.ledger.balance_of(self.debt_token(), account)
    }

    pub fn approve_collateral(&self, owner: Address, spender: Address, amount: U256) {
        self.env
            .ledger
            .approve(self.collateral_token(), owner, spender, amount)
            .expect("approve collateral");
    }

    pub fn approve_debt(&self, owner: Address, spender: Address, amount: U256) {
        self.env
            .ledger
            .approve(self.debt_token(), owner, spender, amount)
            .expect("approve debt");
    }

    pub fn approve_shares(&self, owner: Address, spender: Address, amount: U256) {
        self.env
            .ledger
            .approve(self.env.vault.address(), owner, spender, amount)
            .expect("approve shares");
    }

    /// Move the collateral price to `usd` dollars.
    pub fn set_collateral_price(&self, usd: u64) {
        self.env
            .set_price(Asset::Collateral, Decimal::from(usd))
            .expect("set price");
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Fixture {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &self.env
    }
}
