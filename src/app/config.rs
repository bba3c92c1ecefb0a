//! Simulation configuration loading and validation.
//!
//! A simulation is one TOML file: the market (two tokens and their prices),
//! the vault's leverage settings, the collaborators' parameters and a list of
//! scripted steps. Every section has defaults, so an empty file describes a
//! 3x WETH/USDC vault with no steps.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::domain::ONE_HUNDRED_PERCENT_BPS;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub vault: VaultSettings,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub lender: LenderConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One token and its oracle price in base currency (USD).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u8,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    pub collateral: AssetConfig,
    pub debt: AssetConfig,
    /// Prices older than this many seconds are rejected; unset means never stale.
    pub oracle_heartbeat_secs: Option<u64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            collateral: AssetConfig {
                symbol: "WETH".into(),
                decimals: 18,
                price: Decimal::from(1_000),
            },
            debt: AssetConfig {
                symbol: "USDC".into(),
                decimals: 6,
                price: Decimal::ONE,
            },
            oracle_heartbeat_secs: None,
        }
    }
}

/// Vault leverage settings. Token addresses are assigned by the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultSettings {
    pub name: String,
    pub symbol: String,
    pub target_leverage_bps: u32,
    pub lower_bound_leverage_bps: u32,
    pub upper_bound_leverage_bps: u32,
    pub max_subsidy_bps: u32,
    /// Smallest leveraged deposit, in whole collateral tokens.
    pub min_deposit: Decimal,
    pub leverage_tolerance_bps: u32,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            name: "Leveraged WETH".into(),
            symbol: "lvWETH".into(),
            target_leverage_bps: 30_000,
            lower_bound_leverage_bps: 25_000,
            upper_bound_leverage_bps: 35_000,
            max_subsidy_bps: 500,
            min_deposit: Decimal::new(1, 3),
            leverage_tolerance_bps: 100,
        }
    }
}

/// The simulated router the orchestrators trade through.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VenueConfig {
    pub fee_bps: u32,
    /// Share of each order actually delivered; 10000 fills honestly.
    pub delivery_bps: u32,
    /// Whole collateral tokens the router starts with.
    pub collateral_inventory: Decimal,
    /// Whole debt tokens the router starts with.
    pub debt_inventory: Decimal,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            fee_bps: 0,
            delivery_bps: ONE_HUNDRED_PERCENT_BPS,
            collateral_inventory: Decimal::from(10_000),
            debt_inventory: Decimal::from(10_000_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LenderConfig {
    pub fee_bps: u32,
    /// Whole debt tokens available to flash-borrow.
    pub liquidity: Decimal,
}

impl Default for LenderConfig {
    fn default() -> Self {
        Self {
            fee_bps: 9,
            liquidity: Decimal::from(10_000_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    pub collateral_ltv_bps: u32,
    pub debt_ltv_bps: u32,
    /// Whole debt tokens the pool can lend.
    pub debt_liquidity: Decimal,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            collateral_ltv_bps: 9_000,
            debt_ltv_bps: 8_000,
            debt_liquidity: Decimal::from(10_000_000),
        }
    }
}

/// Which side of the market a step refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Collateral,
    Debt,
}

fn default_slippage_bps() -> u32 {
    100
}

/// One scripted action. Amounts are whole tokens.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Mint collateral to `account`.
    Fund { account: String, amount: Decimal },
    /// Leveraged deposit through the deposit orchestrator.
    Deposit {
        account: String,
        amount: Decimal,
        #[serde(default = "default_slippage_bps")]
        slippage_bps: u32,
        #[serde(default)]
        min_shares: Option<Decimal>,
    },
    /// Redeem through the withdraw orchestrator; all shares when unset.
    Withdraw {
        account: String,
        #[serde(default)]
        shares: Option<Decimal>,
        #[serde(default = "default_slippage_bps")]
        slippage_bps: u32,
        #[serde(default)]
        min_receive: Option<Decimal>,
    },
    /// Move an oracle price.
    SetPrice { asset: Asset, price: Decimal },
    /// Rebalance in whichever direction the vault needs.
    Rebalance {
        account: String,
        #[serde(default = "default_slippage_bps")]
        slippage_bps: u32,
        #[serde(default)]
        min_reward: Option<Decimal>,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Fund { .. } => "fund",
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::SetPrice { .. } => "set_price",
            Self::Rebalance { .. } => "rebalance",
        }
    }
}

impl SimulationConfig {
    /// Load and validate a simulation file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadFile`], [`ConfigError::Parse`] or whichever
    /// validation error the contents trip.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that don't need the environment built. Leverage settings are
    /// validated again by the vault itself.
    pub fn validate(&self) -> Result<()> {
        self.logging.validate()?;
        for (field, asset) in [
            ("market.collateral", &self.market.collateral),
            ("market.debt", &self.market.debt),
        ] {
            if asset.symbol.is_empty() {
                return Err(ConfigError::MissingField { field }.into());
            }
            if asset.price <= Decimal::ZERO {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("price must be positive, got {}", asset.price),
                }
                .into());
            }
        }
        if self.market.collateral.symbol == self.market.debt.symbol {
            return Err(ConfigError::InvalidValue {
                field: "market",
                reason: "collateral and debt must differ".into(),
            }
            .into());
        }
        for (field, bps) in [
            ("venue.fee_bps", self.venue.fee_bps),
            ("lender.fee_bps", self.lender.fee_bps),
            ("pool.collateral_ltv_bps", self.pool.collateral_ltv_bps),
            ("pool.debt_ltv_bps", self.pool.debt_ltv_bps),
        ] {
            if bps > ONE_HUNDRED_PERCENT_BPS {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{bps} bps exceeds 100%"),
                }
                .into());
            }
        }
        for step in &self.steps {
            if let Step::Deposit { slippage_bps, .. }
            | Step::Withdraw { slippage_bps, .. }
            | Step::Rebalance { slippage_bps, .. } = step
            {
                if *slippage_bps > ONE_HUNDRED_PERCENT_BPS {
                    return Err(ConfigError::SlippageTooHigh { bps: *slippage_bps }.into());
                }
            }
            if let Step::SetPrice { price, .. } = step {
                if *price <= Decimal::ZERO {
                    return Err(ConfigError::InvalidValue {
                        field: "steps.price",
                        reason: format!("price must be positive, got {price}"),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_file_uses_defaults() {
        let config = SimulationConfig::parse("").unwrap();
        assert_eq!(config.market.collateral.symbol, "WETH");
        assert_eq!(config.vault.target_leverage_bps, 30_000);
        assert_eq!(config.lender.fee_bps, 9);
        assert!(config.steps.is_empty());
    }

    #[test]
    fn steps_parse_with_defaults() {
        let config = SimulationConfig::parse(
            r#"
            [[steps]]
            action = "fund"
            account = "alice"
            amount = "2.5"

            [[steps]]
            action = "deposit"
            account = "alice"
            amount = "2.5"

            [[steps]]
            action = "set_price"
            asset = "collateral"
            price = "1250"
            "#,
        )
        .unwrap();
        assert_eq!(config.steps.len(), 3);
        assert_eq!(
            config.steps[1],
            Step::Deposit {
                account: "alice".into(),
                amount: dec!(2.5),
                slippage_bps: 100,
                min_shares: None,
            }
        );
        assert_eq!(config.steps[2].action(), "set_price");
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let err = SimulationConfig::parse("[[steps]]\naction = \"liquidate\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = SimulationConfig::parse("[lender]\nfee_bps = 20000\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "lender.fee_bps", .. })
        ));

        let err = SimulationConfig::parse(
            "[[steps]]\naction = \"rebalance\"\naccount = \"k\"\nslippage_bps = 10001\n",
        )
        .unwrap_err();
        assert_eq!(err, Error::Config(ConfigError::SlippageTooHigh { bps: 10_001 }));

        let err = SimulationConfig::parse("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "logging.format", .. })
        ));
    }
}
