//! Leverage accounting engine.
//!
//! A [`LeverageVault`] holds one pooled position in a lending pool: collateral
//! supplied and debt borrowed against it, sized to keep leverage inside
//! `[lower, upper]` around a target. The vault is its own share token on the
//! ledger; each share is a proportional claim on net value
//! (collateral − debt, in base currency).
//!
//! Deposits take *leveraged* collateral and hand back the debt borrowed
//! against it; redemptions require the caller to bring the matching debt. The
//! flash-loan orchestrators in [`crate::orchestrator`] bridge both sides for
//! users who only hold collateral.

mod config;
mod flows;
mod rebalance;

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::domain::math::{self, Quote};
use crate::domain::{Position, RedeemSplit, TokenInfo};
use crate::error::{Result, VaultError};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{LendingPool, PriceOracle};

pub use config::VaultConfig;
pub use rebalance::RebalanceQuote;

/// Leveraged yield vault over one collateral/debt pair.
pub struct LeverageVault {
    address: Address,
    config: VaultConfig,
    collateral: TokenInfo,
    debt: TokenInfo,
    ledger: Arc<Ledger>,
    pool: Arc<dyn LendingPool>,
    oracle: Arc<dyn PriceOracle>,
    guard: ReentrancyGuard,
}

impl LeverageVault {
    /// Validate `config`, then register the vault's share token on the ledger.
    ///
    /// Shares use the collateral token's decimals.
    pub fn new(
        config: VaultConfig,
        ledger: Arc<Ledger>,
        pool: Arc<dyn LendingPool>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self> {
        config.validate()?;
        let collateral = ledger.token(config.collateral_token)?;
        let debt = ledger.token(config.debt_token)?;

        let address = ledger.new_address(&config.symbol);
        ledger.register_token(TokenInfo::new(
            address,
            config.symbol.clone(),
            collateral.decimals,
        ))?;

        info!(
            vault = %address,
            name = %config.name,
            collateral = %collateral.symbol,
            debt = %debt.symbol,
            target = config.target_leverage_bps,
            lower = config.lower_bound_leverage_bps,
            upper = config.upper_bound_leverage_bps,
            "Vault created"
        );

        Ok(Self {
            address,
            config,
            collateral,
            debt,
            ledger,
            pool,
            oracle,
            guard: ReentrancyGuard::new(),
        })
    }

    /// Vault address, which is also the share token address.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn collateral_token(&self) -> &TokenInfo {
        &self.collateral
    }

    pub fn debt_token(&self) -> &TokenInfo {
        &self.debt
    }

    pub fn total_supply(&self) -> U256 {
        self.ledger.total_supply(self.address)
    }

    /// Share balance of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.ledger.balance_of(self.address, account)
    }

    pub fn min_deposit_assets(&self) -> U256 {
        self.config.min_deposit_assets
    }

    /// Oracle quotes for collateral and debt, in that order.
    pub(crate) fn quotes(&self) -> Result<(Quote, Quote)> {
        let collateral = Quote::new(
            self.oracle.asset_price(self.collateral.address)?,
            self.collateral.decimals,
        );
        let debt = Quote::new(
            self.oracle.asset_price(self.debt.address)?,
            self.debt.decimals,
        );
        Ok((collateral, debt))
    }

    /// Current pooled position, valued at oracle prices.
    pub fn position(&self) -> Result<Position> {
        let collateral = self
            .pool
            .supplied_balance(self.collateral.address, self.address);
        let debt = self.pool.borrowed_balance(self.debt.address, self.address);
        let (cq, dq) = self.quotes()?;
        Ok(Position {
            collateral,
            debt,
            collateral_base: math::to_base(collateral, cq.price, cq.decimals)?,
            debt_base: math::to_base(debt, dq.price, dq.decimals)?,
        })
    }

    /// `C·10000 / (C − D)` in base currency; zero when undefined.
    pub fn current_leverage_bps(&self) -> Result<u64> {
        Ok(self.position()?.leverage_bps())
    }

    /// Like [`Self::current_leverage_bps`], but an underwater position reads
    /// as `u64::MAX` instead of zero.
    pub fn effective_leverage_bps(&self) -> Result<u64> {
        Ok(effective_leverage(&self.position()?))
    }

    /// Leverage new deposits are sized at: the current leverage, or the target
    /// while the vault holds no position.
    pub fn deposit_leverage_bps(&self) -> Result<u64> {
        let position = self.position()?;
        let current = position.leverage_bps();
        if position.is_empty() || current == 0 {
            Ok(u64::from(self.config.target_leverage_bps))
        } else {
            Ok(current)
        }
    }

    /// True when the vault holds a position whose leverage is outside bounds.
    /// Deposits and redemptions are closed until it is rebalanced.
    pub fn is_too_imbalanced(&self) -> Result<bool> {
        let position = self.position()?;
        if position.is_empty() {
            return Ok(false);
        }
        Ok(!math::within_bounds(
            effective_leverage(&position),
            self.config.lower_bound_leverage_bps,
            self.config.upper_bound_leverage_bps,
        ))
    }

    /// Net value of the position expressed in collateral units.
    pub fn total_assets(&self) -> Result<U256> {
        let position = self.position()?;
        let (cq, _) = self.quotes()?;
        Ok(math::from_base(position.net_base(), cq.price, cq.decimals)?)
    }

    /// Shares minted for `assets` of net (unleveraged) collateral value.
    pub fn convert_to_shares(&self, assets: U256) -> Result<U256> {
        let supply = self.total_supply();
        if supply.is_zero() {
            return Ok(assets);
        }
        let total = self.total_assets()?;
        if total.is_zero() {
            return Err(VaultError::Insolvent { supply }.into());
        }
        Ok(math::mul_div(assets, supply, total)?)
    }

    /// Net collateral value represented by `shares`.
    pub fn convert_to_assets(&self, shares: U256) -> Result<U256> {
        let supply = self.total_supply();
        if supply.is_zero() {
            return Ok(shares);
        }
        Ok(math::mul_div(shares, self.total_assets()?, supply)?)
    }

    /// Shares a deposit of `assets` leveraged collateral would mint now.
    pub fn preview_deposit(&self, assets: U256) -> Result<U256> {
        let unleveraged = math::unleveraged_assets(assets, self.deposit_leverage_bps()?)?;
        self.convert_to_shares(unleveraged)
    }

    /// Collateral a redemption of `shares` would withdraw.
    pub fn preview_redeem(&self, shares: U256) -> Result<U256> {
        Ok(self.preview_redeem_split(shares)?.collateral)
    }

    /// Collateral released and debt to repay for redeeming `shares`.
    ///
    /// Collateral rounds down and debt rounds up, except that redeeming the
    /// entire supply releases exactly the whole position.
    pub fn preview_redeem_split(&self, shares: U256) -> Result<RedeemSplit> {
        let supply = self.total_supply();
        if supply.is_zero() || shares.is_zero() {
            return Ok(RedeemSplit::default());
        }
        if shares > supply {
            return Err(VaultError::InsufficientShares {
                owner: Address::ZERO,
                balance: supply,
                requested: shares,
            }
            .into());
        }
        let position = self.position()?;
        if shares == supply {
            return Ok(RedeemSplit {
                collateral: position.collateral,
                debt: position.debt,
            });
        }
        Ok(RedeemSplit {
            collateral: math::mul_div(position.collateral, shares, supply)?,
            debt: math::mul_div_up(position.debt, shares, supply)?,
        })
    }

    /// Zero while the vault is too imbalanced, unbounded otherwise.
    pub fn max_deposit(&self, _receiver: Address) -> Result<U256> {
        if self.is_too_imbalanced()? {
            Ok(U256::ZERO)
        } else {
            Ok(U256::MAX)
        }
    }

    /// Zero while the vault is too imbalanced, `owner`'s share balance otherwise.
    pub fn max_redeem(&self, owner: Address) -> Result<U256> {
        if self.is_too_imbalanced()? {
            Ok(U256::ZERO)
        } else {
            Ok(self.balance_of(owner))
        }
    }

    pub fn target_leveraged_assets(&self, unleveraged: U256) -> Result<U256> {
        Ok(math::leveraged_assets(
            unleveraged,
            u64::from(self.config.target_leverage_bps),
        )?)
    }

    /// Gross collateral for `unleveraged` at [`Self::deposit_leverage_bps`].
    pub fn current_leveraged_assets(&self, unleveraged: U256) -> Result<U256> {
        Ok(math::leveraged_assets(
            unleveraged,
            self.deposit_leverage_bps()?,
        )?)
    }

    pub fn unleveraged_assets_with_target_leverage(&self, leveraged: U256) -> Result<U256> {
        Ok(math::unleveraged_assets(
            leveraged,
            u64::from(self.config.target_leverage_bps),
        )?)
    }

    pub fn unleveraged_assets_with_current_leverage(&self, leveraged: U256) -> Result<U256> {
        Ok(math::unleveraged_assets(
            leveraged,
            self.deposit_leverage_bps()?,
        )?)
    }

    /// Debt to repay alongside withdrawing `collateral_withdrawn` so that
    /// leverage stays at `leverage_bps`.
    pub fn repay_amount_keeping_leverage(
        &self,
        collateral_withdrawn: U256,
        leverage_bps: u64,
    ) -> Result<U256> {
        let (cq, dq) = self.quotes()?;
        Ok(math::debt_keeping_leverage(
            collateral_withdrawn,
            leverage_bps,
            cq,
            dq,
        )?)
    }

    /// Debt to borrow alongside supplying `collateral_supplied` so that
    /// leverage stays at `leverage_bps`.
    pub fn borrow_amount_keeping_leverage(
        &self,
        collateral_supplied: U256,
        leverage_bps: u64,
    ) -> Result<U256> {
        let (cq, dq) = self.quotes()?;
        Ok(math::debt_keeping_leverage(
            collateral_supplied,
            leverage_bps,
            cq,
            dq,
        )?)
    }

    fn check_leverage_within_bounds(&self) -> Result<u64> {
        let position = self.position()?;
        let current = effective_leverage(&position);
        let (lower, upper) = (
            self.config.lower_bound_leverage_bps,
            self.config.upper_bound_leverage_bps,
        );
        if !position.is_empty() && !math::within_bounds(current, lower, upper) {
            return Err(VaultError::LeverageOutOfBounds {
                current,
                lower,
                upper,
            }
            .into());
        }
        Ok(current)
    }

    fn ensure_balanced(&self) -> Result<()> {
        if self.is_too_imbalanced()? {
            return Err(VaultError::TooImbalanced {
                current: effective_leverage(&self.position()?),
                lower: self.config.lower_bound_leverage_bps,
                upper: self.config.upper_bound_leverage_bps,
            }
            .into());
        }
        Ok(())
    }
}

/// Leverage with an underwater position (debt ≥ collateral) read as unbounded
/// rather than zero.
pub(crate) fn effective_leverage(position: &Position) -> u64 {
    match position.leverage_bps() {
        0 if !position.is_empty() => u64::MAX,
        leverage => leverage,
    }
}
