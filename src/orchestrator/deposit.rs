//! Collateral in, leveraged shares out.
//!
//! The depositor brings `assets` of collateral. The orchestrator flash-borrows
//! the debt the vault will lend back for the leveraged amount, buys the
//! missing collateral with it, deposits the whole leveraged amount and repays
//! the loan with the debt the vault hands back. Slippage is taken off the
//! leveraged amount, so the vault's loan always covers principal, swap cost
//! and fee; whatever debt is left goes to the receiver.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use tracing::{debug, info};

use super::params::{CallbackParams, DepositParams, PARAMS_VERSION};
use super::{check_receiver, check_slippage, Core, Phase};
use crate::domain::math;
use crate::error::{ConfigError, OrchestratorError, Result, VaultError};
use crate::ledger::{Ledger, ReentrancyGuard};
use crate::port::{callback_success, FlashBorrower, FlashLender, Venue};
use crate::settlement::SettlementResult;
use crate::vault::LeverageVault;

/// Bound on the rounding trims a quote may take before giving up.
const MAX_TRIM_ROUNDS: usize = 4;

/// Amounts an off-chain caller needs to build the venue payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositQuote {
    pub deposit_assets: U256,
    pub leverage_bps: u64,
    /// Collateral the vault receives, net of slippage.
    pub leveraged_assets: U256,
    /// Collateral the swap leg must buy.
    pub swap_output: U256,
    /// Debt flash-borrowed, equal to what the vault lends back.
    pub flash_amount: U256,
    pub flash_fee: U256,
    /// Ceiling on debt the swap leg may spend.
    pub max_swap_input: U256,
    pub expected_shares: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub shares: U256,
    pub deposit_assets: U256,
    pub leveraged_assets: U256,
    pub flash_amount: U256,
    pub flash_fee: U256,
    pub swap: SettlementResult,
    /// Debt left after repaying the flash loan, sent to the receiver.
    pub debt_refund: U256,
}

pub struct DepositOrchestrator {
    core: Core<DepositReceipt>,
}

impl DepositOrchestrator {
    pub fn new(
        ledger: Arc<Ledger>,
        lender: Arc<dyn FlashLender>,
        venue: Arc<dyn Venue>,
        guard: Arc<ReentrancyGuard>,
    ) -> Self {
        Self {
            core: Core::new("deposit-orchestrator", ledger, lender, venue, guard),
        }
    }

    pub fn address(&self) -> Address {
        self.core.address
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Size a deposit of `assets` at the vault's current leverage.
    ///
    /// The loan is rounded down and the swap cost up, so at zero slippage the
    /// leveraged amount is trimmed until the loan covers the fair swap cost.
    /// Slippage must then leave room for the flash fee on top.
    pub fn quote(&self, assets: U256, slippage_bps: u32, vault: &LeverageVault) -> Result<DepositQuote> {
        check_slippage(slippage_bps)?;
        let leverage = vault.deposit_leverage_bps()?;
        let mut leveraged = math::sub_bps(vault.current_leveraged_assets(assets)?, slippage_bps)?;
        let (collateral, debt) = vault.quotes()?;

        let mut sized = None;
        for _ in 0..MAX_TRIM_ROUNDS {
            if leveraged <= assets {
                break;
            }
            let flash_amount = vault.borrow_amount_keeping_leverage(leveraged, leverage)?;
            let swap_cost = math::convert_up(leveraged - assets, collateral, debt)?;
            if swap_cost <= flash_amount {
                sized = Some((flash_amount, swap_cost));
                break;
            }
            // Each unit of collateral dropped frees 1/leverage of its value.
            let gap = math::convert_up(swap_cost - flash_amount, debt, collateral)?;
            let trim = math::leveraged_assets(gap, leverage)?.saturating_add(U256::from(1));
            leveraged = leveraged.saturating_sub(trim);
        }
        let Some((flash_amount, swap_cost)) = sized else {
            return Err(ConfigError::SlippageTooHigh { bps: slippage_bps }.into());
        };

        let flash_fee = self
            .core
            .lender
            .flash_fee(vault.debt_token().address, flash_amount)?;
        if flash_amount - swap_cost < flash_fee {
            return Err(ConfigError::SlippageBelowFlashFee {
                bps: slippage_bps,
                fee: flash_fee,
            }
            .into());
        }
        debug!(%assets, %leveraged, %flash_amount, %swap_cost, %flash_fee, "Deposit sized");

        Ok(DepositQuote {
            deposit_assets: assets,
            leverage_bps: leverage,
            leveraged_assets: leveraged,
            swap_output: leveraged - assets,
            flash_amount,
            flash_fee,
            max_swap_input: flash_amount - flash_fee,
            expected_shares: vault.preview_deposit(leveraged)?,
        })
    }

    /// Deposit `assets` of `caller`'s collateral at the vault's leverage and
    /// mint the shares to `receiver`.
    ///
    /// `caller` must have approved this orchestrator for `assets`.
    /// `venue_payload` must buy [`DepositQuote::swap_output`] collateral for
    /// this orchestrator.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::SharesBelowMinimum`] if fewer than
    ///   `min_output_shares` reach `receiver`.
    /// - Any settlement, vault or lender error, with every change rolled back.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        &self,
        caller: Address,
        assets: U256,
        receiver: Address,
        min_output_shares: U256,
        slippage_bps: u32,
        venue_payload: Bytes,
        vault: &Arc<LeverageVault>,
    ) -> Result<DepositReceipt> {
        let _entry = self.core.guard.enter("deposit")?;
        check_slippage(slippage_bps)?;
        check_receiver(receiver)?;
        if assets.is_zero() {
            return Err(VaultError::ZeroAmount { what: "assets" }.into());
        }

        let ledger = &self.core.ledger;
        ledger.transact(|| {
            let quote = self.quote(assets, slippage_bps, vault)?;
            let collateral = vault.collateral_token().address;
            let debt = vault.debt_token().address;
            let shares_before = vault.balance_of(receiver);

            ledger.transfer_from(collateral, self.core.address, caller, self.core.address, assets)?;

            let params = DepositParams {
                version: PARAMS_VERSION,
                receiver,
                depositAssets: assets,
                leveragedAssets: quote.leveraged_assets,
                slippageBps: slippage_bps,
                venuePayload: venue_payload,
                vault: vault.address(),
            };
            let _flow = self.core.begin(vault)?;
            self.core
                .flash_loan(self, debt, quote.flash_amount, params.encode())?;
            let receipt = self.core.take_receipt()?;

            let shares_after = vault.balance_of(receiver);
            if shares_after <= shares_before {
                return Err(OrchestratorError::SharesNotIncreased {
                    before: shares_before,
                    after: shares_after,
                }
                .into());
            }
            let minted = shares_after - shares_before;
            if minted < min_output_shares {
                return Err(OrchestratorError::SharesBelowMinimum {
                    minted,
                    minimum: min_output_shares,
                }
                .into());
            }

            info!(
                orchestrator = %self.core.address,
                %caller,
                %receiver,
                %assets,
                leveraged = %receipt.leveraged_assets,
                shares = %minted,
                refund = %receipt.debt_refund,
                "Leveraged deposit"
            );
            Ok(receipt)
        })
    }
}

impl FlashBorrower for DepositOrchestrator {
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
        let params = DepositParams::decode(data)?;
        self.core.enter_callback(&vault, params.vault, token)?;

        let me = self.core.address;
        let ledger = &self.core.ledger;
        let collateral = vault.collateral_token().address;
        let owed = amount.saturating_add(fee);
        let max_input = amount.checked_sub(fee).ok_or(OrchestratorError::RepayShortfall {
            available: amount,
            owed,
        })?;

        let swap_output = params.leveragedAssets.saturating_sub(params.depositAssets);
        let swap = self.core.settlement.swap_exact_output(
            token,
            collateral,
            swap_output,
            max_input,
            params.receiver,
            params.venuePayload.clone(),
        )?;

        ledger.approve(collateral, me, vault.address(), params.leveragedAssets)?;
        let shares = vault.deposit(me, params.leveragedAssets, params.receiver)?;

        self.core.approve_repayment(token, owed)?;
        let refund = ledger.balance_of(token, me) - owed;
        if !refund.is_zero() {
            ledger.transfer(token, me, params.receiver, refund)?;
        }

        self.core.settle(DepositReceipt {
            shares,
            deposit_assets: params.depositAssets,
            leveraged_assets: params.leveragedAssets,
            flash_amount: amount,
            flash_fee: fee,
            swap,
            debt_refund: refund,
        });
        Ok(callback_success())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use crate::adapter::{RouterBehavior, SimulatedRouter};
    use crate::error::{ConfigError, Error, OrchestratorError, SwapError};
    use crate::orchestrator::Phase;
    use crate::port::{FlashBorrower, FlashLender};
    use crate::testkit::Fixture;

    const SLIPPAGE: u32 = 100;

    #[test]
    fn quote_sizes_swap_and_loan_from_leverage() {
        let fx = Fixture::new();
        let q = fx.deposit_flow.quote(fx.collateral(1), SLIPPAGE, &fx.vault).unwrap();

        assert_eq!(q.leverage_bps, 30_000);
        // 3x less 1% slippage.
        assert_eq!(q.leveraged_assets, fx.collateral_milli(2_970));
        assert_eq!(q.swap_output, fx.collateral_milli(1_970));
        assert_eq!(q.flash_amount, fx.debt(1_980));
        assert_eq!(q.flash_fee, fx.debt_micro(1_782_000));
        assert_eq!(q.expected_shares, fx.collateral_milli(990));
    }

    #[test]
    fn leveraged_deposit_mints_shares_and_refunds_leftover_debt() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 1);
        fx.approve_collateral(user, fx.deposit_flow.address(), fx.collateral(1));
        let q = fx.deposit_flow.quote(fx.collateral(1), SLIPPAGE, &fx.vault).unwrap();
        let payload = SimulatedRouter::order(
            fx.debt_token(),
            fx.collateral_token(),
            q.swap_output,
            fx.deposit_flow.address(),
        );

        let receipt = fx
            .deposit_flow
            .deposit(user, fx.collateral(1), user, q.expected_shares, SLIPPAGE, payload, &fx.vault)
            .unwrap();

        assert_eq!(receipt.shares, fx.collateral_milli(990));
        assert_eq!(fx.vault.balance_of(user), receipt.shares);
        assert_eq!(fx.vault.current_leverage_bps().unwrap(), 30_000);
        // 1980 borrowed, 1970 swapped, 1.782 fee.
        assert_eq!(receipt.swap.amount_spent, fx.debt(1_970));
        assert_eq!(receipt.debt_refund, fx.debt_micro(8_218_000));
        assert_eq!(fx.debt_balance(user), receipt.debt_refund);
        assert_eq!(fx.collateral_balance(user), U256::ZERO);

        let me = fx.deposit_flow.address();
        assert_eq!(fx.debt_balance(me), U256::ZERO);
        assert_eq!(fx.collateral_balance(me), U256::ZERO);
        assert_eq!(fx.deposit_flow.phase(), Phase::Idle);
    }

    #[test]
    fn shares_below_minimum_roll_everything_back() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 1);
        fx.approve_collateral(user, fx.deposit_flow.address(), fx.collateral(1));
        let q = fx.deposit_flow.quote(fx.collateral(1), SLIPPAGE, &fx.vault).unwrap();
        let payload = SimulatedRouter::order(
            fx.debt_token(),
            fx.collateral_token(),
            q.swap_output,
            fx.deposit_flow.address(),
        );

        let err = fx
            .deposit_flow
            .deposit(user, fx.collateral(1), user, fx.collateral(1), SLIPPAGE, payload, &fx.vault)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Orchestrator(OrchestratorError::SharesBelowMinimum { .. })
        ));
        assert_eq!(fx.collateral_balance(user), fx.collateral(1));
        assert_eq!(fx.vault.total_supply(), U256::ZERO);
        assert_eq!(fx.deposit_flow.phase(), Phase::Idle);
    }

    #[test]
    fn under_delivering_venue_fails_settlement() {
        let fx = Fixture::new();
        fx.router.set_behavior(RouterBehavior {
            delivery_bps: 9_900,
            ..RouterBehavior::default()
        });
        let user = fx.user_with_collateral("alice", 1);
        fx.approve_collateral(user, fx.deposit_flow.address(), fx.collateral(1));
        let q = fx.deposit_flow.quote(fx.collateral(1), SLIPPAGE, &fx.vault).unwrap();
        let payload = SimulatedRouter::order(
            fx.debt_token(),
            fx.collateral_token(),
            q.swap_output,
            fx.deposit_flow.address(),
        );

        let err = fx
            .deposit_flow
            .deposit(user, fx.collateral(1), user, U256::ZERO, SLIPPAGE, payload, &fx.vault)
            .unwrap_err();
        assert!(matches!(err, Error::Swap(SwapError::InsufficientOutput { .. })));
        assert_eq!(fx.collateral_balance(user), fx.collateral(1));
    }

    #[test]
    fn slippage_that_erases_leverage_is_rejected() {
        let fx = Fixture::new();
        let err = fx
            .deposit_flow
            .quote(fx.collateral(1), 6_667, &fx.vault)
            .unwrap_err();
        assert_eq!(err, Error::Config(ConfigError::SlippageTooHigh { bps: 6_667 }));
    }

    #[test]
    fn odd_amount_at_zero_slippage_settles_without_fees() {
        let fx = Fixture::fee_free();
        let me = fx.deposit_flow.address();
        let user = fx.account("alice");
        for assets in [
            fx.collateral(1) + U256::from(123_456_789_012_345u64),
            fx.collateral(1) + U256::from(7u64),
        ] {
            fx.ledger.mint(fx.collateral_token(), user, assets).unwrap();
            fx.approve_collateral(user, me, assets);
            let q = fx.deposit_flow.quote(assets, 0, &fx.vault).unwrap();
            assert!(q.leveraged_assets > assets);
            let payload =
                SimulatedRouter::order(fx.debt_token(), fx.collateral_token(), q.swap_output, me);

            let receipt = fx
                .deposit_flow
                .deposit(user, assets, user, q.expected_shares, 0, payload, &fx.vault)
                .unwrap();

            assert_eq!(receipt.leveraged_assets, q.leveraged_assets);
            assert!(receipt.swap.amount_spent <= q.max_swap_input);
            assert_eq!(fx.collateral_balance(me), U256::ZERO);
            assert_eq!(fx.debt_balance(me), U256::ZERO);
        }
    }

    #[test]
    fn slippage_inside_flash_fee_is_rejected_at_quote() {
        let fx = Fixture::new();
        let fee = fx
            .lender
            .flash_fee(fx.debt_token(), fx.debt(2_000))
            .unwrap();
        let err = fx
            .deposit_flow
            .quote(fx.collateral(1), 0, &fx.vault)
            .unwrap_err();
        assert_eq!(
            err,
            Error::Config(ConfigError::SlippageBelowFlashFee { bps: 0, fee })
        );
    }

    #[test]
    fn zero_receiver_is_rejected() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 1);
        let err = fx
            .deposit_flow
            .deposit(
                user,
                fx.collateral(1),
                alloy_primitives::Address::ZERO,
                U256::ZERO,
                SLIPPAGE,
                Default::default(),
                &fx.vault,
            )
            .unwrap_err();
        assert_eq!(err, Error::Config(ConfigError::ZeroAddress { field: "receiver" }));
    }

    #[test]
    fn callback_outside_a_flow_is_refused() {
        let fx = Fixture::new();
        let err = fx
            .deposit_flow
            .on_flash_loan(
                fx.lender.address(),
                fx.deposit_flow.address(),
                fx.debt_token(),
                fx.debt(1),
                U256::ZERO,
                &Default::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            Error::Orchestrator(OrchestratorError::UnexpectedCallback { phase: "idle" })
        );
    }
}
