//! Scripted simulation runs.
//!
//! Steps run in order against one [`Environment`]. A step that fails is
//! rolled back by the ledger and recorded with its error; later steps still
//! run, so a script can show a revert and carry on.

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::config::{Asset, SimulationConfig, Step};
use super::environment::Environment;
use crate::adapter::SimulatedRouter;
use crate::domain::{RebalanceDirection, ONE_HUNDRED_PERCENT_BPS};
use crate::error::Result;
use crate::orchestrator::{RebalanceFlowQuote, RebalanceReceipt};

/// What happened at one step, with the vault state right after it.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub account: Option<String>,
    pub ok: bool,
    /// Summary on success, the error message on failure.
    pub detail: String,
    pub leverage: Decimal,
    pub total_supply: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultSnapshot {
    pub leverage_bps: u64,
    pub collateral: Decimal,
    pub debt: Decimal,
    /// Net value in collateral tokens.
    pub net_assets: Decimal,
    pub total_supply: Decimal,
    pub too_imbalanced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub name: String,
    pub collateral: Decimal,
    pub debt: Decimal,
    pub shares: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub vault: VaultSnapshot,
    pub accounts: Vec<AccountBalance>,
}

impl SimulationReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

pub struct Simulation {
    env: Environment,
    steps: Vec<Step>,
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        Ok(Self {
            env: Environment::build(config)?,
            steps: config.steps.clone(),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Run every step and report.
    ///
    /// # Errors
    ///
    /// Only when the final state cannot be read (e.g. a stale oracle); step
    /// failures are part of the report.
    pub fn run(&self) -> Result<SimulationReport> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let result = self.apply(step);
            let (ok, detail) = match result {
                Ok(detail) => {
                    info!(index, action = step.action(), %detail, "Step done");
                    (true, detail)
                }
                Err(e) => {
                    warn!(index, action = step.action(), error = %e, "Step failed");
                    (false, e.to_string())
                }
            };
            outcomes.push(StepOutcome {
                index,
                action: step.action(),
                account: account_of(step).map(str::to_string),
                ok,
                detail,
                leverage: leverage_multiple(self.env.vault.current_leverage_bps().unwrap_or(0)),
                total_supply: self.env.whole(self.env.vault.address(), self.env.vault.total_supply()),
            });
        }

        Ok(SimulationReport {
            steps: outcomes,
            vault: self.snapshot()?,
            accounts: self.balances(),
        })
    }

    pub fn snapshot(&self) -> Result<VaultSnapshot> {
        let vault = &self.env.vault;
        let position = vault.position()?;
        Ok(VaultSnapshot {
            leverage_bps: position.leverage_bps(),
            collateral: self.env.whole(self.env.collateral_token(), position.collateral),
            debt: self.env.whole(self.env.debt_token(), position.debt),
            net_assets: self.env.whole(self.env.collateral_token(), vault.total_assets()?),
            total_supply: self.env.whole(vault.address(), vault.total_supply()),
            too_imbalanced: vault.is_too_imbalanced()?,
        })
    }

    fn balances(&self) -> Vec<AccountBalance> {
        let (collateral, debt, shares) = (
            self.env.collateral_token(),
            self.env.debt_token(),
            self.env.vault.address(),
        );
        let ledger = &self.env.ledger;
        self.env
            .accounts()
            .into_iter()
            .map(|(name, address)| AccountBalance {
                name,
                collateral: self.env.whole(collateral, ledger.balance_of(collateral, address)),
                debt: self.env.whole(debt, ledger.balance_of(debt, address)),
                shares: self.env.whole(shares, ledger.balance_of(shares, address)),
            })
            .collect()
    }

    fn apply(&self, step: &Step) -> Result<String> {
        let env = &self.env;
        match step {
            Step::Fund { account, amount } => {
                let to = env.account(account);
                let token = env.collateral_token();
                env.ledger.mint(token, to, env.units(token, *amount)?)?;
                Ok(format!("minted {amount} {}", env.vault.collateral_token().symbol))
            }
            Step::Deposit {
                account,
                amount,
                slippage_bps,
                min_shares,
            } => {
                let user = env.account(account);
                let assets = env.units(env.collateral_token(), *amount)?;
                let min_shares = self.optional_units(env.vault.address(), *min_shares)?;
                let flow = &env.deposit_flow;
                env.ledger
                    .approve(env.collateral_token(), user, flow.address(), assets)?;

                let quote = flow.quote(assets, *slippage_bps, &env.vault)?;
                let payload = SimulatedRouter::order(
                    env.debt_token(),
                    env.collateral_token(),
                    quote.swap_output,
                    flow.address(),
                );
                let receipt = flow.deposit(
                    user,
                    assets,
                    user,
                    min_shares,
                    *slippage_bps,
                    payload,
                    &env.vault,
                )?;
                Ok(format!(
                    "{} shares for {} leveraged, {} debt refunded",
                    env.whole(env.vault.address(), receipt.shares),
                    env.whole(env.collateral_token(), receipt.leveraged_assets),
                    env.whole(env.debt_token(), receipt.debt_refund),
                ))
            }
            Step::Withdraw {
                account,
                shares,
                slippage_bps,
                min_receive,
            } => {
                let user = env.account(account);
                let shares = match shares {
                    Some(amount) => env.units(env.vault.address(), *amount)?,
                    None => env.vault.balance_of(user),
                };
                let min_receive = self.optional_units(env.collateral_token(), *min_receive)?;
                let flow = &env.withdraw_flow;
                env.ledger
                    .approve(env.vault.address(), user, flow.address(), shares)?;

                let quote = flow.quote(shares, *slippage_bps, &env.vault)?;
                let payload = SimulatedRouter::order(
                    env.collateral_token(),
                    env.debt_token(),
                    quote.swap_output,
                    flow.address(),
                );
                let receipt = flow.redeem(
                    user,
                    shares,
                    user,
                    user,
                    *slippage_bps,
                    min_receive,
                    payload,
                    &env.vault,
                )?;
                Ok(format!(
                    "{} shares redeemed for {} collateral",
                    env.whole(env.vault.address(), receipt.shares),
                    env.whole(env.collateral_token(), receipt.collateral_out),
                ))
            }
            Step::SetPrice { asset, price } => {
                env.set_price(*asset, *price)?;
                let symbol = match asset {
                    Asset::Collateral => &env.vault.collateral_token().symbol,
                    Asset::Debt => &env.vault.debt_token().symbol,
                };
                Ok(format!("{symbol} = ${price}"))
            }
            Step::Rebalance {
                account,
                slippage_bps,
                min_reward,
            } => {
                let keeper = env.account(account);
                let receipt = match env.vault.rebalance_direction()? {
                    Some(RebalanceDirection::Decrease) => {
                        let min_reward = self.optional_units(env.collateral_token(), *min_reward)?;
                        let flow = &env.decrease_flow;
                        let quote = flow.quote(*slippage_bps, &env.vault)?;
                        flow.decrease_leverage(
                            keeper,
                            keeper,
                            min_reward,
                            *slippage_bps,
                            rebalance_payload(&quote, flow.address()),
                            &env.vault,
                        )?
                    }
                    // Within bounds the quote itself reports why there is
                    // nothing to do.
                    Some(RebalanceDirection::Increase) | None => {
                        let min_reward = self.optional_units(env.debt_token(), *min_reward)?;
                        let flow = &env.increase_flow;
                        let quote = flow.quote(*slippage_bps, &env.vault)?;
                        flow.increase_leverage(
                            keeper,
                            keeper,
                            min_reward,
                            *slippage_bps,
                            rebalance_payload(&quote, flow.address()),
                            &env.vault,
                        )?
                    }
                };
                Ok(self.describe_rebalance(&receipt))
            }
        }
    }

    fn optional_units(&self, token: Address, amount: Option<Decimal>) -> Result<U256> {
        amount.map_or(Ok(U256::ZERO), |a| self.env.units(token, a))
    }

    fn describe_rebalance(&self, receipt: &RebalanceReceipt) -> String {
        let symbol = self
            .env
            .ledger
            .token(receipt.reward_token)
            .map(|t| t.symbol)
            .unwrap_or_default();
        format!(
            "leverage {}x -> {}x, reward {} {symbol}",
            leverage_multiple(receipt.leverage_before).round_dp(4),
            leverage_multiple(receipt.leverage_after).round_dp(4),
            self.env.whole(receipt.reward_token, receipt.reward),
        )
    }
}

fn rebalance_payload(quote: &RebalanceFlowQuote, recipient: Address) -> alloy_primitives::Bytes {
    SimulatedRouter::order(
        quote.swap_input_token,
        quote.swap_output_token,
        quote.swap_output,
        recipient,
    )
}

fn account_of(step: &Step) -> Option<&str> {
    match step {
        Step::Fund { account, .. }
        | Step::Deposit { account, .. }
        | Step::Withdraw { account, .. }
        | Step::Rebalance { account, .. } => Some(account),
        Step::SetPrice { .. } => None,
    }
}

/// Leverage in bps as a multiple, e.g. 30000 -> 3.
fn leverage_multiple(bps: u64) -> Decimal {
    Decimal::from(bps) / Decimal::from(ONE_HUNDRED_PERCENT_BPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn run(toml: &str) -> SimulationReport {
        let config = SimulationConfig::parse(toml).unwrap();
        Simulation::new(&config).unwrap().run().unwrap()
    }

    #[test]
    fn deposit_then_withdraw_round_trip() {
        let report = run(r#"
            [[steps]]
            action = "fund"
            account = "alice"
            amount = "1"

            [[steps]]
            action = "deposit"
            account = "alice"
            amount = "1"

            [[steps]]
            action = "withdraw"
            account = "alice"
            "#);

        assert_eq!(report.failed_steps(), 0, "{:?}", report.steps);
        assert_eq!(report.steps[1].leverage, dec!(3));
        assert_eq!(report.vault.total_supply, Decimal::ZERO);
        let alice = &report.accounts[0];
        assert_eq!(alice.shares, Decimal::ZERO);
        // Slippage and fees cost a little, never gain.
        assert!(alice.collateral < dec!(1) && alice.collateral > dec!(0.95));
    }

    #[test]
    fn failed_step_is_recorded_and_run_continues() {
        let report = run(r#"
            [[steps]]
            action = "deposit"
            account = "bob"
            amount = "1"

            [[steps]]
            action = "fund"
            account = "bob"
            amount = "1"
            "#);

        assert!(!report.steps[0].ok);
        assert!(report.steps[0].detail.contains("insufficient balance"));
        assert!(report.steps[1].ok);
        assert_eq!(report.failed_steps(), 1);
    }

    #[test]
    fn price_drop_is_rebalanced() {
        let report = run(r#"
            [[steps]]
            action = "fund"
            account = "alice"
            amount = "3"

            [[steps]]
            action = "deposit"
            account = "alice"
            amount = "3"

            [[steps]]
            action = "set_price"
            asset = "collateral"
            price = "850"

            [[steps]]
            action = "rebalance"
            account = "keeper"
            "#);

        assert_eq!(report.failed_steps(), 0, "{:?}", report.steps);
        assert!(report.steps[2].leverage > dec!(3.5));
        let after = report.steps[3].leverage;
        assert!(after >= dec!(2.99) && after <= dec!(3.01), "{after}");
        assert!(!report.vault.too_imbalanced);
    }

    #[test]
    fn rebalance_within_bounds_fails_cleanly() {
        let report = run(r#"
            [[steps]]
            action = "rebalance"
            account = "keeper"
            "#);
        assert!(!report.steps[0].ok);
    }
}
