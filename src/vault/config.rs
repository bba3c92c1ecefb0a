//! Immutable vault configuration.

use alloy_primitives::{Address, U256};
use serde::Serialize;

use crate::domain::ONE_HUNDRED_PERCENT_BPS;
use crate::error::ConfigError;

/// Leverage settings fixed at construction. There are no setters: a vault
/// that needs different bounds is a different vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultConfig {
    /// Share token name.
    pub name: String,
    /// Share token symbol.
    pub symbol: String,
    pub collateral_token: Address,
    pub debt_token: Address,
    pub target_leverage_bps: u32,
    pub lower_bound_leverage_bps: u32,
    pub upper_bound_leverage_bps: u32,
    /// Cap on the premium paid to rebalancers.
    pub max_subsidy_bps: u32,
    /// Smallest leveraged deposit accepted, in collateral units.
    pub min_deposit_assets: U256,
    /// How far past target (in leverage bps) a rebalance may land.
    pub leverage_tolerance_bps: u32,
}

impl VaultConfig {
    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on zero token addresses, identical tokens,
    /// bounds that are not `10000 < lower <= target <= upper`, a subsidy cap
    /// above 100%, or a subsidy cap so large the decrease formula degenerates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collateral_token.is_zero() {
            return Err(ConfigError::ZeroAddress {
                field: "vault.collateral_token",
            });
        }
        if self.debt_token.is_zero() {
            return Err(ConfigError::ZeroAddress {
                field: "vault.debt_token",
            });
        }
        if self.collateral_token == self.debt_token {
            return Err(ConfigError::InvalidValue {
                field: "vault.debt_token",
                reason: "must differ from collateral token".into(),
            });
        }

        let (lower, target, upper) = (
            self.lower_bound_leverage_bps,
            self.target_leverage_bps,
            self.upper_bound_leverage_bps,
        );
        if lower <= ONE_HUNDRED_PERCENT_BPS || lower > target || target > upper {
            return Err(ConfigError::LeverageBoundsMisordered {
                lower,
                target,
                upper,
            });
        }

        if self.max_subsidy_bps > ONE_HUNDRED_PERCENT_BPS {
            return Err(ConfigError::InvalidValue {
                field: "vault.max_subsidy_bps",
                reason: format!("{} exceeds 100%", self.max_subsidy_bps),
            });
        }
        // subsidy * (target - 1x) must stay below 1e8 for decrease_to_target.
        let spread = u64::from(target - ONE_HUNDRED_PERCENT_BPS);
        if u64::from(self.max_subsidy_bps) * spread >= 100_000_000 {
            return Err(ConfigError::InvalidValue {
                field: "vault.max_subsidy_bps",
                reason: format!(
                    "{} is too large for target leverage {target}",
                    self.max_subsidy_bps
                ),
            });
        }

        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "vault.name" });
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "vault.symbol",
            });
        }
        Ok(())
    }
}
