//! Snapshot of a vault's pooled position.

use std::fmt;

use alloy_primitives::U256;
use serde::Serialize;

use super::math::leverage_bps;

/// Pooled collateral and debt of a vault, in token units and base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Collateral supplied to the lending pool, in collateral token units.
    pub collateral: U256,
    /// Debt owed to the lending pool, in debt token units.
    pub debt: U256,
    /// Oracle value of `collateral`.
    pub collateral_base: U256,
    /// Oracle value of `debt`.
    pub debt_base: U256,
}

impl Position {
    /// Net value in base currency; zero when underwater.
    #[must_use]
    pub fn net_base(&self) -> U256 {
        self.collateral_base.saturating_sub(self.debt_base)
    }

    /// Current leverage in bps, zero when undefined.
    #[must_use]
    pub fn leverage_bps(&self) -> u64 {
        leverage_bps(self.collateral_base, self.debt_base)
    }

    /// True when nothing is supplied and nothing is owed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collateral.is_zero() && self.debt.is_zero()
    }
}

/// Proportional slice of the position released by a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RedeemSplit {
    /// Collateral withdrawn to the receiver.
    pub collateral: U256,
    /// Debt the caller must repay on the vault's behalf.
    pub debt: U256,
}

/// Which way a rebalance moves leverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RebalanceDirection {
    /// Leverage is below the lower bound; supply collateral and borrow.
    Increase,
    /// Leverage is above the upper bound; repay debt and withdraw.
    Decrease,
}

impl fmt::Display for RebalanceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => write!(f, "increase"),
            Self::Decrease => write!(f, "decrease"),
        }
    }
}
