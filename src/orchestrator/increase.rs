//! Rebalance up for a reward in debt.
//!
//! Flash-borrows debt, buys the collateral the vault asks for, supplies it
//! and takes the vault's subsidized debt payout. Whatever is left after
//! repaying the loan is the caller's reward.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{info, warn};

use super::params::{CallbackParams, RebalanceParams, PARAMS_VERSION};
use super::{
    check_receiver, check_slippage, debt_for_collateral, rebalance_quote, Core, Phase,
    RebalanceFlowQuote, RebalanceReceipt,
};
use crate::domain::RebalanceDirection;
use crate::error::{OrchestratorError, Result};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{callback_success, FlashBorrower, FlashLender, Venue};
use crate::vault::LeverageVault;

pub struct IncreaseLeverageOrchestrator {
    core: Core<RebalanceReceipt>,
}

impl IncreaseLeverageOrchestrator {
    pub fn new(
        ledger: Arc<Ledger>,
        lender: Arc<dyn FlashLender>,
        venue: Arc<dyn Venue>,
        guard: Arc<ReentrancyGuard>,
    ) -> Self {
        Self {
            core: Core::new("increase-orchestrator", ledger, lender, venue, guard),
        }
    }

    pub fn address(&self) -> Address {
        self.core.address
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Loan and swap sizes for bringing leverage up to target now.
    pub fn quote(&self, slippage_bps: u32, vault: &LeverageVault) -> Result<RebalanceFlowQuote> {
        check_slippage(slippage_bps)?;
        let rebalance = rebalance_quote(vault, RebalanceDirection::Increase)?;
        let debt = vault.debt_token().address;
        let flash_amount = debt_for_collateral(vault, rebalance.input_amount, slippage_bps)?;
        Ok(RebalanceFlowQuote {
            rebalance,
            flash_amount,
            flash_fee: self.core.lender.flash_fee(debt, flash_amount)?,
            swap_input_token: debt,
            swap_output_token: vault.collateral_token().address,
            swap_output: rebalance.input_amount,
            max_swap_input: flash_amount,
        })
    }

    /// Bring the vault's leverage up to target and pay the debt reward to
    /// `receiver`.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::LeverageWithinBounds`] when there is nothing to do.
    /// - [`crate::error::VaultError::WrongRebalanceDirection`] when leverage
    ///   is above the upper bound instead.
    /// - [`OrchestratorError::RewardBelowMinimum`] if the reward falls short of
    ///   `min_reward`.
    pub fn increase_leverage(
        &self,
        caller: Address,
        receiver: Address,
        min_reward: U256,
        slippage_bps: u32,
        venue_payload: Bytes,
        vault: &Arc<LeverageVault>,
    ) -> Result<RebalanceReceipt> {
        let _entry = self.core.guard.enter("increase_leverage")?;
        check_slippage(slippage_bps)?;
        check_receiver(receiver)?;

        self.core.ledger.transact(|| {
            let quote = self.quote(slippage_bps, vault)?;
            let params = RebalanceParams {
                version: PARAMS_VERSION,
                receiver,
                amount: quote.rebalance.input_amount,
                minReward: min_reward,
                slippageBps: slippage_bps,
                venuePayload: venue_payload,
                vault: vault.address(),
            };
            let _flow = self.core.begin(vault)?;
            self.core.flash_loan(
                self,
                vault.debt_token().address,
                quote.flash_amount,
                params.encode(),
            )?;
            let receipt = self.core.take_receipt()?;

            info!(
                orchestrator = %self.core.address,
                %caller,
                %receiver,
                before = receipt.leverage_before,
                after = receipt.leverage_after,
                reward = %receipt.reward,
                "Leverage increased"
            );
            Ok(receipt)
        })
    }
}

impl FlashBorrower for IncreaseLeverageOrchestrator {
    fn address(&self) -> Address {
        self.core.address
    }

    fn on_flash_loan(
        &self,
        caller: Address,
        initiator: Address,
        token: Address,
        amount: U256,
        fee: U256,
        data: &Bytes,
    ) -> Result<B256> {
        let vault = self.core.authenticate(caller, initiator)?;
        let params = RebalanceParams::decode(data)?;
        self.core.enter_callback(&vault, params.vault, token)?;

        let me = self.core.address;
        let ledger = &self.core.ledger;
        let collateral = vault.collateral_token().address;
        let owed = amount.saturating_add(fee);
        let before = vault.effective_leverage_bps()?;
        let subsidy_bps = vault.current_subsidy_bps()?;

        let swap = self.core.settlement.swap_exact_output(
            token,
            collateral,
            params.amount,
            amount,
            params.receiver,
            params.venuePayload.clone(),
        )?;

        ledger.approve(collateral, me, vault.address(), params.amount)?;
        let debt_out = vault.increase_leverage(
            me,
            params.amount,
            swap.amount_spent.saturating_add(fee),
        )?;

        self.core.approve_repayment(token, owed)?;
        let reward = ledger.balance_of(token, me) - owed;
        if reward < params.minReward {
            warn!(%reward, minimum = %params.minReward, "Rebalance reward below minimum");
            return Err(OrchestratorError::RewardBelowMinimum {
                reward,
                minimum: params.minReward,
            }
            .into());
        }
        if !reward.is_zero() {
            ledger.transfer(token, me, params.receiver, reward)?;
        }

        self.core.settle(RebalanceReceipt {
            leverage_before: before,
            leverage_after: vault.effective_leverage_bps()?,
            subsidy_bps,
            vault_input: params.amount,
            vault_output: debt_out,
            flash_amount: amount,
            flash_fee: fee,
            swap_spent: swap.amount_spent,
            reward_token: token,
            reward,
        });
        Ok(callback_success())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use crate::adapter::SimulatedRouter;
    use crate::error::{Error, OrchestratorError, VaultError};
    use crate::testkit::Fixture;

    const SLIPPAGE: u32 = 100;

    fn underleveraged() -> Fixture {
        let fx = Fixture::new();
        fx.seed_vault(3);
        fx.set_collateral_price(1_250);
        fx
    }

    #[test]
    fn rebalance_lands_inside_bounds_and_pays_debt_reward() {
        let fx = underleveraged();
        let keeper = fx.ledger.new_address("keeper");
        let q = fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap();
        assert!(q.rebalance.current_leverage_bps < 25_000);
        let payload = SimulatedRouter::order(
            q.swap_input_token,
            q.swap_output_token,
            q.swap_output,
            fx.increase_flow.address(),
        );

        let receipt = fx
            .increase_flow
            .increase_leverage(keeper, keeper, U256::from(1u8), SLIPPAGE, payload, &fx.vault)
            .unwrap();

        let after = fx.vault.current_leverage_bps().unwrap();
        assert!((25_000..=35_000).contains(&after));
        assert!(after.abs_diff(30_000) <= 100);
        assert_eq!(receipt.leverage_after, after);
        assert_eq!(receipt.reward_token, fx.debt_token());
        assert!(!receipt.reward.is_zero());
        assert_eq!(fx.debt_balance(keeper), receipt.reward);
        assert_eq!(fx.debt_balance(fx.increase_flow.address()), U256::ZERO);
        assert_eq!(fx.collateral_balance(fx.increase_flow.address()), U256::ZERO);
    }

    #[test]
    fn unreachable_minimum_reward_reverts() {
        let fx = underleveraged();
        let keeper = fx.ledger.new_address("keeper");
        let q = fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap();
        let before = fx.vault.position().unwrap();
        let payload = SimulatedRouter::order(
            q.swap_input_token,
            q.swap_output_token,
            q.swap_output,
            fx.increase_flow.address(),
        );

        let err = fx
            .increase_flow
            .increase_leverage(keeper, keeper, fx.debt(1_000_000), SLIPPAGE, payload, &fx.vault)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Orchestrator(OrchestratorError::RewardBelowMinimum { .. })
        ));
        assert_eq!(fx.vault.position().unwrap(), before);
    }

    #[test]
    fn balanced_vault_has_nothing_to_rebalance() {
        let fx = Fixture::new();
        fx.seed_vault(3);
        let err = fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap_err();
        assert!(matches!(
            err,
            Error::Orchestrator(OrchestratorError::LeverageWithinBounds { current: 30_000, .. })
        ));
    }

    #[test]
    fn overleveraged_vault_needs_the_other_direction() {
        let fx = Fixture::new();
        fx.seed_vault(3);
        fx.set_collateral_price(850);
        let err = fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap_err();
        assert!(matches!(
            err,
            Error::Vault(VaultError::WrongRebalanceDirection { .. })
        ));
    }
}
