//! Vault-side rebalancing.
//!
//! When leverage drifts out of `[lower, upper]`, anyone may push it back
//! toward target: below the lower bound by supplying collateral for debt,
//! above the upper bound by repaying debt for collateral. The vault pays the
//! rebalancer the value they brought plus a subsidy proportional to the
//! deviation, capped at `max_subsidy_bps`.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{effective_leverage, LeverageVault};
use crate::domain::math::{self, Quote};
use crate::domain::{Position, RebalanceDirection, ONE_HUNDRED_PERCENT_BPS};
use crate::error::{Result, VaultError};

/// Amounts that bring leverage back to target at current prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebalanceQuote {
    pub direction: RebalanceDirection,
    pub current_leverage_bps: u64,
    pub target_leverage_bps: u32,
    pub subsidy_bps: u32,
    /// Collateral to supply when increasing, debt to repay when decreasing.
    pub input_amount: U256,
    /// Debt paid out when increasing, collateral paid out when decreasing.
    pub output_amount: U256,
}

impl LeverageVault {
    /// Direction a rebalance must take now, or `None` while within bounds.
    pub fn rebalance_direction(&self) -> Result<Option<RebalanceDirection>> {
        Ok(self.direction_for(&self.position()?))
    }

    /// Subsidy a rebalance would earn now; zero while within bounds.
    pub fn current_subsidy_bps(&self) -> Result<u32> {
        let position = self.position()?;
        if self.direction_for(&position).is_none() {
            return Ok(0);
        }
        Ok(self.subsidy_for(effective_leverage(&position)))
    }

    /// Input and output that land leverage on target, or `None` while within
    /// bounds.
    pub fn quote_rebalance(&self) -> Result<Option<RebalanceQuote>> {
        let position = self.position()?;
        let Some(direction) = self.direction_for(&position) else {
            return Ok(None);
        };
        let current = effective_leverage(&position);
        let subsidy = self.subsidy_for(current);
        let target = self.config.target_leverage_bps;
        let (cq, dq) = self.quotes()?;

        let (input_amount, output_amount) = match direction {
            RebalanceDirection::Increase => {
                let value = math::increase_to_target(
                    position.collateral_base,
                    position.debt_base,
                    target,
                    subsidy,
                )?;
                let collateral_in = math::from_base(value, cq.price, cq.decimals)?;
                (collateral_in, with_subsidy(collateral_in, subsidy, cq, dq)?)
            }
            RebalanceDirection::Decrease => {
                let value = math::decrease_to_target(
                    position.collateral_base,
                    position.debt_base,
                    target,
                    subsidy,
                )?;
                let debt_in = math::from_base(value, dq.price, dq.decimals)?.min(position.debt);
                (debt_in, with_subsidy(debt_in, subsidy, dq, cq)?)
            }
        };

        Ok(Some(RebalanceQuote {
            direction,
            current_leverage_bps: current,
            target_leverage_bps: target,
            subsidy_bps: subsidy,
            input_amount,
            output_amount,
        }))
    }

    /// Supply `collateral_in` from `caller` and pay out its value in debt plus
    /// the subsidy. Only allowed while leverage is below the lower bound.
    /// Returns the debt paid out.
    pub fn increase_leverage(
        &self,
        caller: Address,
        collateral_in: U256,
        min_debt_out: U256,
    ) -> Result<U256> {
        let _entry = self.guard.enter("vault.increase_leverage")?;

        self.ledger.transact(|| {
            if collateral_in.is_zero() {
                return Err(VaultError::ZeroAmount {
                    what: "collateral in",
                }
                .into());
            }
            let position = self.position()?;
            let before = self.require_direction(&position, RebalanceDirection::Increase)?;
            let subsidy = self.subsidy_for(before);
            let (cq, dq) = self.quotes()?;

            let debt_out = with_subsidy(collateral_in, subsidy, cq, dq)?;
            if debt_out < min_debt_out {
                return Err(VaultError::BelowMinimumOutput {
                    received: debt_out,
                    minimum: min_debt_out,
                }
                .into());
            }

            let collateral = self.collateral.address;
            let pool = self.pool.address();
            self.ledger
                .transfer_from(collateral, self.address, caller, self.address, collateral_in)?;
            self.ledger
                .approve(collateral, self.address, pool, collateral_in)?;
            self.pool
                .supply(self.address, collateral, collateral_in, self.address)?;
            self.pool
                .borrow(self.address, self.debt.address, debt_out, self.address)?;
            self.ledger
                .transfer(self.debt.address, self.address, caller, debt_out)?;

            let after = effective_leverage(&self.position()?);
            self.check_progress(RebalanceDirection::Increase, before, after)?;

            info!(
                vault = %self.address,
                %caller,
                %collateral_in,
                %debt_out,
                subsidy,
                before,
                after,
                "Increased leverage"
            );
            Ok(debt_out)
        })
    }

    /// Repay `debt_in` from `caller` and pay out its value in collateral plus
    /// the subsidy. Only allowed while leverage is above the upper bound.
    /// `debt_in` is capped at the outstanding debt. Returns the collateral paid
    /// out.
    pub fn decrease_leverage(
        &self,
        caller: Address,
        debt_in: U256,
        min_collateral_out: U256,
    ) -> Result<U256> {
        let _entry = self.guard.enter("vault.decrease_leverage")?;

        self.ledger.transact(|| {
            let position = self.position()?;
            let debt_in = debt_in.min(position.debt);
            if debt_in.is_zero() {
                return Err(VaultError::ZeroAmount { what: "debt in" }.into());
            }
            let before = self.require_direction(&position, RebalanceDirection::Decrease)?;
            let subsidy = self.subsidy_for(before);
            let (cq, dq) = self.quotes()?;

            let debt = self.debt.address;
            let pool = self.pool.address();
            self.ledger
                .transfer_from(debt, self.address, caller, self.address, debt_in)?;
            self.ledger.approve(debt, self.address, pool, debt_in)?;
            let repaid = self.pool.repay(self.address, debt, debt_in, self.address)?;
            if repaid < debt_in {
                debug!(%repaid, %debt_in, "Refunding unrepaid debt");
                self.ledger
                    .transfer(debt, self.address, caller, debt_in - repaid)?;
            }

            let collateral_out = with_subsidy(repaid, subsidy, dq, cq)?;
            if collateral_out < min_collateral_out {
                return Err(VaultError::BelowMinimumOutput {
                    received: collateral_out,
                    minimum: min_collateral_out,
                }
                .into());
            }
            self.pool.withdraw(
                self.address,
                self.collateral.address,
                collateral_out,
                caller,
            )?;

            let after = effective_leverage(&self.position()?);
            self.check_progress(RebalanceDirection::Decrease, before, after)?;

            info!(
                vault = %self.address,
                %caller,
                debt_in = %repaid,
                %collateral_out,
                subsidy,
                before,
                after,
                "Decreased leverage"
            );
            Ok(collateral_out)
        })
    }

    fn direction_for(&self, position: &Position) -> Option<RebalanceDirection> {
        if position.is_empty() {
            return None;
        }
        let current = effective_leverage(position);
        if current < u64::from(self.config.lower_bound_leverage_bps) {
            Some(RebalanceDirection::Increase)
        } else if current > u64::from(self.config.upper_bound_leverage_bps) {
            Some(RebalanceDirection::Decrease)
        } else {
            None
        }
    }

    fn subsidy_for(&self, current: u64) -> u32 {
        math::subsidy_bps(
            current,
            self.config.target_leverage_bps,
            self.config.max_subsidy_bps,
        )
    }

    /// Current effective leverage, provided it calls for `required`.
    fn require_direction(&self, position: &Position, required: RebalanceDirection) -> Result<u64> {
        let current = effective_leverage(position);
        match self.direction_for(position) {
            Some(direction) if direction == required => Ok(current),
            Some(direction) => Err(VaultError::WrongRebalanceDirection {
                current,
                required: direction,
            }
            .into()),
            None => {
                warn!(current, "Rebalance rejected, leverage within bounds");
                Err(VaultError::LeverageWithinBounds {
                    current,
                    lower: self.config.lower_bound_leverage_bps,
                    upper: self.config.upper_bound_leverage_bps,
                }
                .into())
            }
        }
    }

    fn check_progress(&self, direction: RebalanceDirection, before: u64, after: u64) -> Result<()> {
        let target = self.config.target_leverage_bps;
        let tolerance = self.config.leverage_tolerance_bps;
        let target_bps = u64::from(target);
        let tolerance_bps = u64::from(tolerance);

        let (improved, overshot) = match direction {
            RebalanceDirection::Increase => (after > before, after > target_bps + tolerance_bps),
            RebalanceDirection::Decrease => (
                after < before,
                after < target_bps.saturating_sub(tolerance_bps),
            ),
        };
        if !improved {
            return Err(VaultError::LeverageNotImproved {
                before,
                after,
                target,
            }
            .into());
        }
        if overshot {
            return Err(VaultError::LeverageOvershoot {
                after,
                target,
                tolerance,
            }
            .into());
        }
        Ok(())
    }
}

/// Value of `amount` converted `from` → `to`, plus `subsidy` bps on top.
fn with_subsidy(amount: U256, subsidy: u32, from: Quote, to: Quote) -> Result<U256> {
    let value = math::convert(amount, from, to)?;
    Ok(math::mul_div(
        value,
        U256::from(ONE_HUNDRED_PERCENT_BPS + subsidy),
        U256::from(ONE_HUNDRED_PERCENT_BPS),
    )?)
}
