//! Flash-loan orchestrated periphery flows.
//!
//! Each orchestrator turns one user intent into a single atomic sequence:
//! borrow from the flash lender, swap through the bound venue, act on the
//! vault, repay. Orchestrators keep no state between calls; the only state
//! they hold is the [`Phase`] of the call in flight, used to authenticate the
//! lender's callback.
//!
//! # Flows
//!
//! - [`DepositOrchestrator`] - collateral in, leveraged shares out
//! - [`WithdrawOrchestrator`] - shares in, net collateral out
//! - [`IncreaseLeverageOrchestrator`] - rebalance up, reward in debt token
//! - [`DecreaseLeverageOrchestrator`] - rebalance down, reward in collateral
//!
//! All four share one [`ReentrancyGuard`] so venue code called mid-flow cannot
//! start a sibling flow.

mod decrease;
mod deposit;
mod increase;
pub mod params;
mod withdraw;

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::math;
use crate::domain::{RebalanceDirection, ONE_HUNDRED_PERCENT_BPS};
use crate::error::{ConfigError, Error, FlashLoanError, OrchestratorError, Result, VaultError};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{FlashBorrower, FlashLender, Venue};
use crate::settlement::{SwapSettlement, VenueAdapter};
use crate::vault::{LeverageVault, RebalanceQuote};

pub use decrease::DecreaseLeverageOrchestrator;
pub use deposit::{DepositOrchestrator, DepositQuote, DepositReceipt};
pub use increase::IncreaseLeverageOrchestrator;
pub use withdraw::{WithdrawOrchestrator, WithdrawQuote, WithdrawReceipt};

/// Where an orchestrator is in its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    /// Flash loan requested; only the bound lender's callback is accepted.
    AwaitingFlashLoan,
    InCallback,
    /// Callback finished and left a receipt for the entry point.
    Settled,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingFlashLoan => "awaiting_flash_loan",
            Self::InCallback => "in_callback",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt shared by both rebalancing flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebalanceReceipt {
    pub leverage_before: u64,
    pub leverage_after: u64,
    pub subsidy_bps: u32,
    /// Collateral supplied (increase) or debt repaid (decrease).
    pub vault_input: U256,
    /// Debt (increase) or collateral (decrease) paid out by the vault.
    pub vault_output: U256,
    pub flash_amount: U256,
    pub flash_fee: U256,
    pub swap_spent: U256,
    /// Token the reward was paid in.
    pub reward_token: Address,
    pub reward: U256,
}

/// Quote shared by both rebalancing flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebalanceFlowQuote {
    pub rebalance: RebalanceQuote,
    /// Debt borrowed from the flash lender.
    pub flash_amount: U256,
    pub flash_fee: U256,
    /// Input token of the swap leg.
    pub swap_input_token: Address,
    /// Output token of the swap leg.
    pub swap_output_token: Address,
    /// Exact output the swap leg must buy; the venue payload is built for this.
    pub swap_output: U256,
    /// Ceiling on the swap leg's input.
    pub max_swap_input: U256,
}

struct FlowState<R> {
    phase: Phase,
    vault: Option<Arc<LeverageVault>>,
    receipt: Option<R>,
}

/// Machinery every orchestrator is built on: its address, the bound lender
/// and venue, the shared guard and the in-flight call state.
struct Core<R> {
    address: Address,
    ledger: Arc<Ledger>,
    lender: Arc<dyn FlashLender>,
    settlement: SwapSettlement<VenueAdapter>,
    guard: Arc<ReentrancyGuard>,
    state: Mutex<FlowState<R>>,
}

impl<R> Core<R> {
    fn new(
        label: &str,
        ledger: Arc<Ledger>,
        lender: Arc<dyn FlashLender>,
        venue: Arc<dyn Venue>,
        guard: Arc<ReentrancyGuard>,
    ) -> Self {
        let address = ledger.new_address(label);
        let executor = VenueAdapter::new(address, ledger.clone(), venue);
        let settlement = SwapSettlement::new(address, ledger.clone(), executor);
        Self {
            address,
            ledger,
            lender,
            settlement,
            guard,
            state: Mutex::new(FlowState {
                phase: Phase::Idle,
                vault: None,
                receipt: None,
            }),
        }
    }

    fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Move to `AwaitingFlashLoan` for `vault`. The returned handle puts the
    /// orchestrator back to `Idle` when dropped, whatever the outcome.
    fn begin(&self, vault: &Arc<LeverageVault>) -> Result<FlowHandle<'_, R>> {
        let mut state = self.state.lock();
        if state.phase != Phase::Idle {
            return Err(Error::Reentrancy {
                entry: "flash loan flow",
                active: state.phase.as_str(),
            });
        }
        state.phase = Phase::AwaitingFlashLoan;
        state.vault = Some(vault.clone());
        state.receipt = None;
        Ok(FlowHandle { core: self })
    }

    /// Check the callback comes from the bound lender, for a loan this
    /// orchestrator asked for, while one is expected. Returns the vault bound
    /// to the call.
    fn authenticate(&self, caller: Address, initiator: Address) -> Result<Arc<LeverageVault>> {
        let state = self.state.lock();
        if state.phase != Phase::AwaitingFlashLoan {
            warn!(orchestrator = %self.address, phase = %state.phase, "Callback outside an active flow");
            return Err(OrchestratorError::UnexpectedCallback {
                phase: state.phase.as_str(),
            }
            .into());
        }
        if caller != self.lender.address() {
            warn!(orchestrator = %self.address, %caller, "Callback from untrusted lender");
            return Err(OrchestratorError::UntrustedLender { caller }.into());
        }
        if initiator != self.address {
            warn!(orchestrator = %self.address, %initiator, "Callback for foreign initiator");
            return Err(OrchestratorError::UntrustedInitiator { initiator }.into());
        }
        state.vault.clone().ok_or_else(|| {
            OrchestratorError::UnexpectedCallback {
                phase: state.phase.as_str(),
            }
            .into()
        })
    }

    /// Bind decoded params to the in-flight call and move to `InCallback`.
    fn enter_callback(&self, vault: &LeverageVault, params_vault: Address, token: Address) -> Result<()> {
        if params_vault != vault.address() {
            return Err(OrchestratorError::VaultMismatch {
                actual: params_vault,
                expected: vault.address(),
            }
            .into());
        }
        let expected = vault.debt_token().address;
        if token != expected {
            return Err(OrchestratorError::WrongFlashToken {
                actual: token,
                expected,
            }
            .into());
        }
        self.state.lock().phase = Phase::InCallback;
        Ok(())
    }

    fn settle(&self, receipt: R) {
        let mut state = self.state.lock();
        state.phase = Phase::Settled;
        state.receipt = Some(receipt);
    }

    fn take_receipt(&self) -> Result<R> {
        let mut state = self.state.lock();
        if state.phase != Phase::Settled {
            return Err(OrchestratorError::MissingReceipt.into());
        }
        state
            .receipt
            .take()
            .ok_or_else(|| OrchestratorError::MissingReceipt.into())
    }

    fn flash_loan(&self, borrower: &dyn FlashBorrower, token: Address, amount: U256, data: Bytes) -> Result<()> {
        debug!(orchestrator = %self.address, %token, %amount, "Requesting flash loan");
        if !self
            .lender
            .flash_loan(self.address, borrower, token, amount, data)?
        {
            return Err(FlashLoanError::CallbackFailed.into());
        }
        Ok(())
    }

    /// Approve the lender to pull `owed` of `token`, provided it is on hand.
    fn approve_repayment(&self, token: Address, owed: U256) -> Result<()> {
        let available = self.ledger.balance_of(token, self.address);
        if available < owed {
            return Err(OrchestratorError::RepayShortfall { available, owed }.into());
        }
        self.ledger
            .approve(token, self.address, self.lender.address(), owed)
    }
}

/// Resets the orchestrator to `Idle` when the entry point returns.
struct FlowHandle<'a, R> {
    core: &'a Core<R>,
}

impl<R> Drop for FlowHandle<'_, R> {
    fn drop(&mut self) {
        let mut state = self.core.state.lock();
        state.phase = Phase::Idle;
        state.vault = None;
        state.receipt = None;
    }
}

/// The vault's rebalance quote, provided it calls for `required`.
fn rebalance_quote(vault: &LeverageVault, required: RebalanceDirection) -> Result<RebalanceQuote> {
    let Some(quote) = vault.quote_rebalance()? else {
        let config = vault.config();
        return Err(OrchestratorError::LeverageWithinBounds {
            current: vault.effective_leverage_bps()?,
            lower: config.lower_bound_leverage_bps,
            upper: config.upper_bound_leverage_bps,
        }
        .into());
    };
    if quote.direction != required {
        return Err(VaultError::WrongRebalanceDirection {
            current: quote.current_leverage_bps,
            required: quote.direction,
        }
        .into());
    }
    Ok(quote)
}

fn check_slippage(bps: u32) -> Result<()> {
    if bps > ONE_HUNDRED_PERCENT_BPS {
        return Err(ConfigError::SlippageTooHigh { bps }.into());
    }
    Ok(())
}

/// Swap ceiling for buying `debt_out` with collateral: oracle value plus
/// slippage, capped at what is on hand.
fn collateral_for_debt(
    vault: &LeverageVault,
    debt_out: U256,
    slippage_bps: u32,
    available: U256,
) -> Result<U256> {
    let (collateral, debt) = vault.quotes()?;
    let fair = math::convert_up(debt_out, debt, collateral)?;
    Ok(math::add_bps_up(fair, slippage_bps)?.min(available))
}

/// Swap ceiling for buying `collateral_out` with debt: oracle value plus
/// slippage.
fn debt_for_collateral(vault: &LeverageVault, collateral_out: U256, slippage_bps: u32) -> Result<U256> {
    let (collateral, debt) = vault.quotes()?;
    let fair = math::convert_up(collateral_out, collateral, debt)?;
    Ok(math::add_bps_up(fair, slippage_bps)?)
}

fn check_receiver(receiver: Address) -> Result<()> {
    if receiver.is_zero() {
        return Err(ConfigError::ZeroAddress { field: "receiver" }.into());
    }
    Ok(())
}
