//! Rebalance down for a reward in collateral.
//!
//! Flash-borrows the debt the vault wants repaid, takes the subsidized
//! collateral payout, sells enough of it to repay the loan and keeps the rest
//! as the caller's reward.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{debug, info, warn};

use super::params::{CallbackParams, RebalanceParams, PARAMS_VERSION};
use super::{
    check_receiver, check_slippage, collateral_for_debt, rebalance_quote, Core, Phase,
    RebalanceFlowQuote, RebalanceReceipt,
};
use crate::domain::RebalanceDirection;
use crate::error::{OrchestratorError, Result};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{callback_success, FlashBorrower, FlashLender, Venue};
use crate::vault::LeverageVault;

pub struct DecreaseLeverageOrchestrator {
    core: Core<RebalanceReceipt>,
}

impl DecreaseLeverageOrchestrator {
    pub fn new(
        ledger: Arc<Ledger>,
        lender: Arc<dyn FlashLender>,
        venue: Arc<dyn Venue>,
        guard: Arc<ReentrancyGuard>,
    ) -> Self {
        Self {
            core: Core::new("decrease-orchestrator", ledger, lender, venue, guard),
        }
    }

    pub fn address(&self) -> Address {
        self.core.address
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn quote(&self, slippage_bps: u32, vault: &LeverageVault) -> Result<RebalanceFlowQuote> {
        check_slippage(slippage_bps)?;
        let rebalance = rebalance_quote(vault, RebalanceDirection::Decrease)?;
        let debt = vault.debt_token().address;
        let flash_amount = rebalance.input_amount;
        let flash_fee = self.core.lender.flash_fee(debt, flash_amount)?;
        let swap_output = flash_amount.saturating_add(flash_fee);
        Ok(RebalanceFlowQuote {
            rebalance,
            flash_amount,
            flash_fee,
            swap_input_token: vault.collateral_token().address,
            swap_output_token: debt,
            swap_output,
            max_swap_input: collateral_for_debt(
                vault,
                swap_output,
                slippage_bps,
                rebalance.output_amount,
            )?,
        })
    }

    /// Bring the vault's leverage down to target and pay the collateral
    /// reward to `receiver`.
    pub fn decrease_leverage(
        &self,
        caller: Address,
        receiver: Address,
        min_reward: U256,
        slippage_bps: u32,
        venue_payload: Bytes,
        vault: &Arc<LeverageVault>,
    ) -> Result<RebalanceReceipt> {
        let _entry = self.core.guard.enter("decrease_leverage")?;
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
                "Leverage decreased"
            );
            Ok(receipt)
        })
    }
}

impl FlashBorrower for DecreaseLeverageOrchestrator {
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

        let collateral_before = ledger.balance_of(collateral, me);
        let debt_before = ledger.balance_of(token, me);
        ledger.approve(token, me, vault.address(), params.amount)?;
        vault.decrease_leverage(me, params.amount, U256::ZERO)?;
        ledger.approve(token, me, vault.address(), U256::ZERO)?;

        let received = ledger.balance_of(collateral, me).saturating_sub(collateral_before);
        let debt_held = ledger.balance_of(token, me);
        let repaid = debt_before.saturating_sub(debt_held);
        let need = owed.saturating_sub(debt_held);
        debug!(%received, %repaid, %need, "Vault paid out collateral");

        let spent = if need.is_zero() {
            U256::ZERO
        } else {
            let max_in = collateral_for_debt(&vault, need, params.slippageBps, received)?;
            self.core
                .settlement
                .swap_exact_output(
                    collateral,
                    token,
                    need,
                    max_in,
                    params.receiver,
                    params.venuePayload.clone(),
                )?
                .amount_spent
        };

        let reward = received.saturating_sub(spent);
        if reward < params.minReward {
            warn!(%reward, minimum = %params.minReward, "Rebalance reward below minimum");
            return Err(OrchestratorError::RewardBelowMinimum {
                reward,
                minimum: params.minReward,
            }
            .into());
        }
        if !reward.is_zero() {
            ledger.transfer(collateral, me, params.receiver, reward)?;
        }
        self.core.approve_repayment(token, owed)?;

        self.core.settle(RebalanceReceipt {
            leverage_before: before,
            leverage_after: vault.effective_leverage_bps()?,
            subsidy_bps,
            vault_input: repaid,
            vault_output: received,
            flash_amount: amount,
            flash_fee: fee,
            swap_spent: spent,
            reward_token: collateral,
            reward,
        });
        Ok(callback_success())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use crate::adapter::{RouterBehavior, SimulatedRouter};
    use crate::error::{Error, TokenError, VaultError};
    use crate::testkit::Fixture;

    const SLIPPAGE: u32 = 100;

    fn overleveraged() -> Fixture {
        let fx = Fixture::new();
        fx.seed_vault(3);
        fx.set_collateral_price(850);
        fx
    }

    #[test]
    fn rebalance_lands_inside_bounds_and_pays_collateral_reward() {
        let fx = overleveraged();
        let keeper = fx.ledger.new_address("keeper");
        let q = fx.decrease_flow.quote(SLIPPAGE, &fx.vault).unwrap();
        assert!(q.rebalance.current_leverage_bps > 35_000);
        let payload = SimulatedRouter::order(
            q.swap_input_token,
            q.swap_output_token,
            q.swap_output,
            fx.decrease_flow.address(),
        );

        let receipt = fx
            .decrease_flow
            .decrease_leverage(keeper, keeper, U256::from(1u8), SLIPPAGE, payload, &fx.vault)
            .unwrap();

        let after = fx.vault.current_leverage_bps().unwrap();
        assert!(after.abs_diff(30_000) <= 100);
        assert_eq!(receipt.reward_token, fx.collateral_token());
        assert!(!receipt.reward.is_zero());
        assert_eq!(fx.collateral_balance(keeper), receipt.reward);
        assert_eq!(fx.debt_balance(fx.decrease_flow.address()), U256::ZERO);
        assert_eq!(fx.collateral_balance(fx.decrease_flow.address()), U256::ZERO);
    }

    #[test]
    fn swap_ceiling_stops_an_overpriced_venue() {
        let fx = overleveraged();
        let keeper = fx.ledger.new_address("keeper");
        fx.router.set_behavior(RouterBehavior {
            fee_bps: 500,
            ..Default::default()
        });
        let q = fx.decrease_flow.quote(SLIPPAGE, &fx.vault).unwrap();
        let payload = SimulatedRouter::order(
            q.swap_input_token,
            q.swap_output_token,
            q.swap_output,
            fx.decrease_flow.address(),
        );

        let err = fx
            .decrease_flow
            .decrease_leverage(keeper, keeper, U256::ZERO, SLIPPAGE, payload, &fx.vault)
            .unwrap_err();
        // The venue pulls more than the scoped approval allows.
        assert!(matches!(
            err,
            Error::Token(TokenError::InsufficientAllowance { .. })
        ));
        assert!(fx.vault.current_leverage_bps().unwrap() > 35_000);
    }

    #[test]
    fn underleveraged_vault_needs_the_other_direction() {
        let fx = Fixture::new();
        fx.seed_vault(3);
        fx.set_collateral_price(1_250);
        let err = fx.decrease_flow.quote(SLIPPAGE, &fx.vault).unwrap_err();
        assert!(matches!(
            err,
            Error::Vault(VaultError::WrongRebalanceDirection { .. })
        ));
        let keeper = fx.ledger.new_address("keeper");
        let err = fx
            .decrease_flow
            .decrease_leverage(keeper, keeper, U256::ZERO, SLIPPAGE, Default::default(), &fx.vault)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Vault(VaultError::WrongRebalanceDirection { .. })
        ));
    }
}
