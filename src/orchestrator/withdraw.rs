//! Shares in, net collateral out.
//!
//! Redeeming needs the owner's slice of debt up front. The orchestrator
//! flash-borrows it, redeems into itself, sells just enough of the released
//! collateral to cover principal and fee, and hands the rest to the receiver.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::params::{CallbackParams, WithdrawParams, PARAMS_VERSION};
use super::{check_receiver, check_slippage, collateral_for_debt, Core, Phase};
use crate::error::{FlashLoanError, OrchestratorError, Result, VaultError};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{callback_success, FlashBorrower, FlashLender, Venue};
use crate::settlement::SettlementResult;
use crate::vault::LeverageVault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawQuote {
    pub shares: U256,
    /// Collateral the vault releases for `shares`.
    pub collateral: U256,
    /// Debt the vault needs repaid for `shares`.
    pub debt_repay: U256,
    pub flash_amount: U256,
    pub flash_fee: U256,
    /// Debt the swap leg must buy: principal plus fee.
    pub swap_output: U256,
    /// Ceiling on collateral the swap leg may sell.
    pub max_swap_input: U256,
    /// Collateral left for the receiver if the swap spends its whole ceiling.
    pub expected_collateral_out: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    pub shares: U256,
    pub collateral_withdrawn: U256,
    pub debt_repaid: U256,
    pub flash_amount: U256,
    pub flash_fee: U256,
    /// `None` when the borrowed debt was enough on its own.
    pub swap: Option<SettlementResult>,
    /// Collateral delivered to the receiver.
    pub collateral_out: U256,
}

pub struct WithdrawOrchestrator {
    core: Core<WithdrawReceipt>,
}

impl WithdrawOrchestrator {
    pub fn new(
        ledger: Arc<Ledger>,
        lender: Arc<dyn FlashLender>,
        venue: Arc<dyn Venue>,
        guard: Arc<ReentrancyGuard>,
    ) -> Self {
        Self {
            core: Core::new("withdraw-orchestrator", ledger, lender, venue, guard),
        }
    }

    pub fn address(&self) -> Address {
        self.core.address
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn quote(&self, shares: U256, slippage_bps: u32, vault: &LeverageVault) -> Result<WithdrawQuote> {
        check_slippage(slippage_bps)?;
        let split = vault.preview_redeem_split(shares)?;
        let debt = vault.debt_token().address;

        let available = self.core.lender.max_flash_loan(debt);
        if split.debt > available {
            return Err(FlashLoanError::ExceedsMaxFlashLoan {
                requested: split.debt,
                available,
            }
            .into());
        }
        let flash_fee = self.core.lender.flash_fee(debt, split.debt)?;
        let swap_output = split.debt.saturating_add(flash_fee);
        let max_swap_input = collateral_for_debt(vault, swap_output, slippage_bps, split.collateral)?;

        Ok(WithdrawQuote {
            shares,
            collateral: split.collateral,
            debt_repay: split.debt,
            flash_amount: split.debt,
            flash_fee,
            swap_output,
            max_swap_input,
            expected_collateral_out: split.collateral - max_swap_input,
        })
    }

    /// Redeem `owner`'s `shares` and deliver the net collateral to `receiver`.
    ///
    /// Only the owner may start a redemption, and they must have approved this
    /// orchestrator for `shares` of the vault token. `venue_payload` must buy
    /// [`WithdrawQuote::swap_output`] debt for this orchestrator.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::NotOwner`] when `caller != owner`.
    /// - [`OrchestratorError::BelowMinimumReceive`] if less than
    ///   `min_receive_amount` collateral is left for `receiver`.
    /// - [`OrchestratorError::InvalidSharesBurned`] if the vault burned a
    ///   different number of shares than requested.
    /// - [`OrchestratorError::UnexpectedDebtIncrease`] if the flow leaves debt
    ///   behind in the orchestrator.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem(
        &self,
        caller: Address,
        shares: U256,
        receiver: Address,
        owner: Address,
        slippage_bps: u32,
        min_receive_amount: U256,
        venue_payload: Bytes,
        vault: &Arc<LeverageVault>,
    ) -> Result<WithdrawReceipt> {
        let _entry = self.core.guard.enter("redeem")?;
        check_slippage(slippage_bps)?;
        check_receiver(receiver)?;
        if caller != owner {
            warn!(%caller, %owner, "Redeem on behalf of another owner");
            return Err(OrchestratorError::NotOwner { caller, owner }.into());
        }
        if shares.is_zero() {
            return Err(VaultError::ZeroAmount { what: "shares" }.into());
        }

        let me = self.core.address;
        let ledger = &self.core.ledger;
        ledger.transact(|| {
            let quote = self.quote(shares, slippage_bps, vault)?;
            let debt = vault.debt_token().address;
            let shares_before = vault.balance_of(owner);
            let debt_before = ledger.balance_of(debt, me);

            let params = WithdrawParams {
                version: PARAMS_VERSION,
                receiver,
                owner,
                shares,
                minReceiveAmount: min_receive_amount,
                slippageBps: slippage_bps,
                venuePayload: venue_payload,
                vault: vault.address(),
            };
            let _flow = self.core.begin(vault)?;
            self.core
                .flash_loan(self, debt, quote.flash_amount, params.encode())?;
            let receipt = self.core.take_receipt()?;

            let burned = shares_before.saturating_sub(vault.balance_of(owner));
            if burned != shares {
                return Err(OrchestratorError::InvalidSharesBurned {
                    burned,
                    requested: shares,
                }
                .into());
            }
            let debt_after = ledger.balance_of(debt, me);
            if debt_after > debt_before {
                return Err(OrchestratorError::UnexpectedDebtIncrease {
                    before: debt_before,
                    after: debt_after,
                }
                .into());
            }

            info!(
                orchestrator = %me,
                %owner,
                %receiver,
                %shares,
                withdrawn = %receipt.collateral_withdrawn,
                repaid = %receipt.debt_repaid,
                out = %receipt.collateral_out,
                "Leveraged redeem"
            );
            Ok(receipt)
        })
    }
}

impl FlashBorrower for WithdrawOrchestrator {
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
        let params = WithdrawParams::decode(data)?;
        self.core.enter_callback(&vault, params.vault, token)?;

        let me = self.core.address;
        let ledger = &self.core.ledger;
        let collateral = vault.collateral_token().address;
        let owed = amount.saturating_add(fee);

        let collateral_before = ledger.balance_of(collateral, me);
        let debt_before = ledger.balance_of(token, me);
        ledger.approve(token, me, vault.address(), amount)?;
        vault.redeem(me, params.shares, me, params.owner)?;
        ledger.approve(token, me, vault.address(), U256::ZERO)?;

        let received = ledger.balance_of(collateral, me).saturating_sub(collateral_before);
        let debt_held = ledger.balance_of(token, me);
        let repaid = debt_before.saturating_sub(debt_held);
        let need = owed.saturating_sub(debt_held);
        debug!(%received, %repaid, %need, "Redeemed into orchestrator");

        let swap = if need.is_zero() {
            None
        } else {
            let max_in = collateral_for_debt(&vault, need, params.slippageBps, received)?;
            Some(self.core.settlement.swap_exact_output(
                collateral,
                token,
                need,
                max_in,
                params.receiver,
                params.venuePayload.clone(),
            )?)
        };
        let spent = swap.map_or(U256::ZERO, |s| s.amount_spent);

        let remaining = received.saturating_sub(spent);
        if remaining < params.minReceiveAmount {
            warn!(%remaining, minimum = %params.minReceiveAmount, "Redeem output below minimum");
            return Err(OrchestratorError::BelowMinimumReceive {
                received: remaining,
                minimum: params.minReceiveAmount,
            }
            .into());
        }
        if !remaining.is_zero() {
            ledger.transfer(collateral, me, params.receiver, remaining)?;
        }
        self.core.approve_repayment(token, owed)?;

        self.core.settle(WithdrawReceipt {
            shares: params.shares,
            collateral_withdrawn: received,
            debt_repaid: repaid,
            flash_amount: amount,
            flash_fee: fee,
            swap,
            collateral_out: remaining,
        });
        Ok(callback_success())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};

    use crate::adapter::{RouterBehavior, SimulatedRouter};
    use crate::error::{Error, OrchestratorError};
    use crate::orchestrator::Phase;
    use crate::testkit::Fixture;

    const SLIPPAGE: u32 = 100;

    /// Alice deposits 3 collateral straight into the vault at 3x, holding
    /// one share unit and 2000 debt.
    fn with_position(fx: &Fixture) -> (Address, U256) {
        let alice = fx.user_with_collateral("alice", 3);
        fx.approve_collateral(alice, fx.vault.address(), fx.collateral(3));
        let shares = fx.vault.deposit(alice, fx.collateral(3), alice).unwrap();
        fx.approve_shares(alice, fx.withdraw_flow.address(), shares);
        (alice, shares)
    }

    fn payload(fx: &Fixture, amount: U256) -> alloy_primitives::Bytes {
        SimulatedRouter::order(
            fx.collateral_token(),
            fx.debt_token(),
            amount,
            fx.withdraw_flow.address(),
        )
    }

    #[test]
    fn quote_covers_principal_and_fee() {
        let fx = Fixture::new();
        let (_, shares) = with_position(&fx);
        let q = fx.withdraw_flow.quote(shares, SLIPPAGE, &fx.vault).unwrap();
        assert_eq!(q.collateral, fx.collateral(3));
        assert_eq!(q.flash_amount, fx.debt(2_000));
        assert_eq!(q.flash_fee, fx.debt_micro(1_800_000));
        assert_eq!(q.swap_output, fx.debt_micro(2_001_800_000));
    }

    #[test]
    fn full_redeem_returns_net_collateral() {
        let fx = Fixture::new();
        let (alice, shares) = with_position(&fx);
        let debt_held = fx.debt_balance(alice);
        let q = fx.withdraw_flow.quote(shares, SLIPPAGE, &fx.vault).unwrap();

        let receipt = fx
            .withdraw_flow
            .redeem(
                alice,
                shares,
                alice,
                alice,
                SLIPPAGE,
                q.expected_collateral_out,
                payload(&fx, q.swap_output),
                &fx.vault,
            )
            .unwrap();

        // 3 collateral less 2001.8 debt worth at 1000.
        let out = U256::from(998_200_000_000_000_000u64);
        assert_eq!(receipt.collateral_out, out);
        assert_eq!(fx.collateral_balance(alice), out);
        assert_eq!(receipt.debt_repaid, fx.debt(2_000));
        assert_eq!(fx.debt_balance(alice), debt_held);
        assert_eq!(fx.vault.total_supply(), U256::ZERO);
        assert!(fx.vault.position().unwrap().is_empty());
        assert_eq!(fx.debt_balance(fx.withdraw_flow.address()), U256::ZERO);
        assert_eq!(fx.withdraw_flow.phase(), Phase::Idle);
    }

    #[test]
    fn over_delivery_is_forwarded_to_receiver() {
        let fx = Fixture::new();
        let (alice, shares) = with_position(&fx);
        let debt_held = fx.debt_balance(alice);
        fx.router.set_behavior(RouterBehavior {
            delivery_bps: 10_100,
            ..RouterBehavior::default()
        });
        let q = fx.withdraw_flow.quote(shares, SLIPPAGE, &fx.vault).unwrap();

        let receipt = fx
            .withdraw_flow
            .redeem(
                alice,
                shares,
                alice,
                alice,
                SLIPPAGE,
                U256::ZERO,
                payload(&fx, q.swap_output),
                &fx.vault,
            )
            .unwrap();

        // 1% of 2001.8 extra debt lands with alice.
        assert_eq!(fx.debt_balance(alice) - debt_held, fx.debt_micro(20_018_000));
        assert_eq!(receipt.swap.map(|s| s.amount_received), Some(q.swap_output));
        assert_eq!(fx.debt_balance(fx.withdraw_flow.address()), U256::ZERO);
    }

    #[test]
    fn minimum_receive_is_enforced() {
        let fx = Fixture::new();
        let (alice, shares) = with_position(&fx);
        let q = fx.withdraw_flow.quote(shares, SLIPPAGE, &fx.vault).unwrap();

        let err = fx
            .withdraw_flow
            .redeem(
                alice,
                shares,
                alice,
                alice,
                SLIPPAGE,
                fx.collateral(1),
                payload(&fx, q.swap_output),
                &fx.vault,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Orchestrator(OrchestratorError::BelowMinimumReceive { .. })
        ));
        assert_eq!(fx.vault.balance_of(alice), shares);
        assert_eq!(fx.collateral_balance(alice), U256::ZERO);
    }

    #[test]
    fn only_the_owner_may_redeem() {
        let fx = Fixture::new();
        let (alice, shares) = with_position(&fx);
        let mallory = fx.ledger.new_address("mallory");

        let err = fx
            .withdraw_flow
            .redeem(
                mallory,
                shares,
                mallory,
                alice,
                SLIPPAGE,
                U256::ZERO,
                Default::default(),
                &fx.vault,
            )
            .unwrap_err();
        assert_eq!(
            err,
            Error::Orchestrator(OrchestratorError::NotOwner {
                caller: mallory,
                owner: alice
            })
        );
    }
}
