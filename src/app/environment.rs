//! Wiring of a vault, its orchestrators and in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;

use super::config::{Asset, SimulationConfig};
use crate::adapter::{
    InMemoryFlashLender, InMemoryLendingPool, RouterBehavior, SimulatedRouter, StaticOracle,
};
use crate::domain::{format_units, parse_units};
use crate::error::{ConfigError, Result};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::orchestrator::{
    DecreaseLeverageOrchestrator, DepositOrchestrator, IncreaseLeverageOrchestrator,
    WithdrawOrchestrator,
};
use crate::port::{FlashLender, LendingPool, PriceOracle, Venue, PRICE_DECIMALS};
use crate::vault::{LeverageVault, VaultConfig};

/// Everything a simulation runs against, sharing one ledger.
pub struct Environment {
    pub ledger: Arc<Ledger>,
    pub oracle: Arc<StaticOracle>,
    pub pool: Arc<InMemoryLendingPool>,
    pub lender: Arc<InMemoryFlashLender>,
    pub router: Arc<SimulatedRouter>,
    /// Shared by all four orchestrators.
    pub guard: Arc<ReentrancyGuard>,
    pub vault: Arc<LeverageVault>,
    pub deposit_flow: DepositOrchestrator,
    pub withdraw_flow: WithdrawOrchestrator,
    pub increase_flow: IncreaseLeverageOrchestrator,
    pub decrease_flow: DecreaseLeverageOrchestrator,
    accounts: Mutex<BTreeMap<String, Address>>,
}

impl Environment {
    /// Create the tokens, price them, fund the collaborators and deploy the
    /// vault with its orchestrators.
    ///
    /// # Errors
    ///
    /// Any configuration the vault or collaborators reject.
    pub fn build(config: &SimulationConfig) -> Result<Self> {
        let ledger = Arc::new(Ledger::new());
        let market = &config.market;
        let collateral = ledger.create_token(&market.collateral.symbol, market.collateral.decimals)?;
        let debt = ledger.create_token(&market.debt.symbol, market.debt.decimals)?;

        let oracle = match market.oracle_heartbeat_secs {
            Some(seconds) => StaticOracle::new().with_heartbeat(seconds),
            None => StaticOracle::new(),
        };
        let oracle = Arc::new(oracle);
        oracle.set_price(collateral, price_units(market.collateral.price, "market.collateral.price")?);
        oracle.set_price(debt, price_units(market.debt.price, "market.debt.price")?);
        let price_feed: Arc<dyn PriceOracle> = oracle.clone();

        let pool = Arc::new(InMemoryLendingPool::new(ledger.clone(), price_feed.clone()));
        pool.list_reserve(collateral, config.pool.collateral_ltv_bps)?;
        pool.list_reserve(debt, config.pool.debt_ltv_bps)?;
        ledger.mint(
            debt,
            pool.address(),
            token_units(&ledger, debt, config.pool.debt_liquidity, "pool.debt_liquidity")?,
        )?;

        let lender = Arc::new(InMemoryFlashLender::new(ledger.clone(), config.lender.fee_bps));
        lender.support(debt);
        ledger.mint(
            debt,
            lender.address(),
            token_units(&ledger, debt, config.lender.liquidity, "lender.liquidity")?,
        )?;

        let router = Arc::new(SimulatedRouter::new(ledger.clone(), price_feed.clone()));
        router.set_behavior(RouterBehavior {
            fee_bps: config.venue.fee_bps,
            delivery_bps: config.venue.delivery_bps,
            misdirect_to: None,
        });
        ledger.mint(
            collateral,
            router.address(),
            token_units(&ledger, collateral, config.venue.collateral_inventory, "venue.collateral_inventory")?,
        )?;
        ledger.mint(
            debt,
            router.address(),
            token_units(&ledger, debt, config.venue.debt_inventory, "venue.debt_inventory")?,
        )?;

        let settings = &config.vault;
        let vault_config = VaultConfig {
            name: settings.name.clone(),
            symbol: settings.symbol.clone(),
            collateral_token: collateral,
            debt_token: debt,
            target_leverage_bps: settings.target_leverage_bps,
            lower_bound_leverage_bps: settings.lower_bound_leverage_bps,
            upper_bound_leverage_bps: settings.upper_bound_leverage_bps,
            max_subsidy_bps: settings.max_subsidy_bps,
            min_deposit_assets: token_units(&ledger, collateral, settings.min_deposit, "vault.min_deposit")?,
            leverage_tolerance_bps: settings.leverage_tolerance_bps,
        };
        let pool_port: Arc<dyn LendingPool> = pool.clone();
        let vault = Arc::new(LeverageVault::new(
            vault_config,
            ledger.clone(),
            pool_port,
            price_feed,
        )?);

        let guard = Arc::new(ReentrancyGuard::new());
        let lender_port: Arc<dyn FlashLender> = lender.clone();
        let venue: Arc<dyn Venue> = router.clone();
        let deposit_flow =
            DepositOrchestrator::new(ledger.clone(), lender_port.clone(), venue.clone(), guard.clone());
        let withdraw_flow =
            WithdrawOrchestrator::new(ledger.clone(), lender_port.clone(), venue.clone(), guard.clone());
        let increase_flow = IncreaseLeverageOrchestrator::new(
            ledger.clone(),
            lender_port.clone(),
            venue.clone(),
            guard.clone(),
        );
        let decrease_flow =
            DecreaseLeverageOrchestrator::new(ledger.clone(), lender_port, venue, guard.clone());

        info!(
            vault = %vault.address(),
            collateral = %market.collateral.symbol,
            debt = %market.debt.symbol,
            "Environment ready"
        );

        Ok(Self {
            ledger,
            oracle,
            pool,
            lender,
            router,
            guard,
            vault,
            deposit_flow,
            withdraw_flow,
            increase_flow,
            decrease_flow,
            accounts: Mutex::new(BTreeMap::new()),
        })
    }

    /// Address for a named account, created on first use.
    pub fn account(&self, name: &str) -> Address {
        *self
            .accounts
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| self.ledger.new_address(name))
    }

    /// Named accounts created so far.
    pub fn accounts(&self) -> Vec<(String, Address)> {
        self.accounts
            .lock()
            .iter()
            .map(|(name, address)| (name.clone(), *address))
            .collect()
    }

    pub fn collateral_token(&self) -> Address {
        self.vault.collateral_token().address
    }

    pub fn debt_token(&self) -> Address {
        self.vault.debt_token().address
    }

    pub fn token_of(&self, asset: Asset) -> Address {
        match asset {
            Asset::Collateral => self.collateral_token(),
            Asset::Debt => self.debt_token(),
        }
    }

    /// Base units of `token` for `amount` whole tokens.
    pub fn units(&self, token: Address, amount: Decimal) -> Result<U256> {
        token_units(&self.ledger, token, amount, "amount")
    }

    /// Whole tokens for `amount` base units of `token`.
    pub fn whole(&self, token: Address, amount: U256) -> Decimal {
        let decimals = self.ledger.token(token).map_or(0, |t| t.decimals);
        format_units(amount, decimals)
    }

    /// Publish a USD price for `asset`.
    pub fn set_price(&self, asset: Asset, price: Decimal) -> Result<()> {
        self.oracle.set_price(self.token_of(asset), price_units(price, "price")?);
        Ok(())
    }
}

fn price_units(price: Decimal, field: &'static str) -> Result<U256> {
    match parse_units(price, PRICE_DECIMALS) {
        Some(units) if !units.is_zero() => Ok(units),
        _ => Err(ConfigError::InvalidValue {
            field,
            reason: format!("price {price} is not a positive amount"),
        }
        .into()),
    }
}

fn token_units(ledger: &Ledger, token: Address, amount: Decimal, field: &'static str) -> Result<U256> {
    let decimals = ledger.token(token)?.decimals;
    parse_units(amount, decimals).ok_or_else(|| {
        ConfigError::InvalidValue {
            field,
            reason: format!("{amount} is not a valid token amount"),
        }
        .into()
    })
}
