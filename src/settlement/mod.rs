//! Exact-output swaps with verified settlement.
//!
//! [`SwapSettlement`] wraps a venue-specific [`SwapExecutor`] and decides
//! success solely from the holder's own balance deltas. The venue's calldata is
//! opaque and externally supplied, so whatever it (or the executor) reports is
//! never used to judge the outcome.
//!
//! The measured account is always the holder, the contract that owns the
//! settlement and to which the venue delivers. Measuring any other account
//! (for instance the surplus receiver) would make the shortfall check
//! unreachable and strand refunds.

mod venue;

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, SwapError};
use crate::ledger::Ledger;
use crate::port::{SwapExecutor, SwapRequest};

pub use venue::VenueAdapter;

/// Outcome of a settled exact-output swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    /// Input consumed, from the holder's input balance delta.
    pub amount_spent: U256,
    /// Output gained, from the holder's output balance delta.
    pub amount_received: U256,
    /// `amount_received - amount_out`, never above the output tolerance.
    pub surplus: U256,
}

/// Settlement primitive bound to one holder and one executor.
pub struct SwapSettlement<E> {
    holder: Address,
    ledger: Arc<Ledger>,
    executor: E,
    output_tolerance: U256,
}

impl<E: SwapExecutor> SwapSettlement<E> {
    pub fn new(holder: Address, ledger: Arc<Ledger>, executor: E) -> Self {
        Self {
            holder,
            ledger,
            executor,
            output_tolerance: U256::ZERO,
        }
    }

    /// Allow up to `tolerance` output above `amount_out` to remain with the
    /// holder (rounding dust the venue did not forward).
    #[must_use]
    pub fn with_output_tolerance(mut self, tolerance: U256) -> Self {
        self.output_tolerance = tolerance;
        self
    }

    /// Buy exactly `amount_out` of `output_token`, spending at most
    /// `amount_in_maximum` of `input_token`.
    ///
    /// # Errors
    ///
    /// - [`SwapError::SlippageExceeded`] if more input than allowed left the holder.
    /// - [`SwapError::InsufficientOutput`] if the holder gained less than `amount_out`.
    /// - [`SwapError::UnexpectedAmount`] if more than `amount_out + tolerance`
    ///   stayed with the holder, whoever `receiver` is.
    ///
    /// Any error rolls back every transfer the swap made.
    pub fn swap_exact_output(
        &self,
        input_token: Address,
        output_token: Address,
        amount_out: U256,
        amount_in_maximum: U256,
        receiver: Address,
        payload: Bytes,
    ) -> Result<SettlementResult> {
        if input_token == output_token {
            return Err(SwapError::IdenticalTokens { token: input_token }.into());
        }
        if amount_out.is_zero() {
            return Err(SwapError::ZeroAmountOut.into());
        }

        let request = SwapRequest {
            input_token,
            output_token,
            amount_out,
            amount_in_maximum,
            receiver,
            payload,
        };

        self.ledger.transact(|| {
            let input_before = self.ledger.balance_of(input_token, self.holder);
            let output_before = self.ledger.balance_of(output_token, self.holder);

            let reported_spent = self.executor.execute(&request)?;

            let input_after = self.ledger.balance_of(input_token, self.holder);
            let output_after = self.ledger.balance_of(output_token, self.holder);

            let spent = input_before.saturating_sub(input_after);
            let received = output_after.saturating_sub(output_before);

            if spent > amount_in_maximum {
                warn!(%spent, maximum = %amount_in_maximum, "Swap exceeded input ceiling");
                return Err(SwapError::SlippageExceeded {
                    spent,
                    maximum: amount_in_maximum,
                }
                .into());
            }
            if received < amount_out {
                warn!(%received, expected = %amount_out, "Swap under-delivered");
                return Err(SwapError::InsufficientOutput {
                    received,
                    expected: amount_out,
                }
                .into());
            }
            let allowed = amount_out.saturating_add(self.output_tolerance);
            if received > allowed {
                warn!(%received, %allowed, "Swap left surplus with the holder");
                return Err(SwapError::UnexpectedAmount { received, allowed }.into());
            }
            if reported_spent != spent {
                debug!(reported = %reported_spent, measured = %spent, "Executor report differs from measured spend");
            }

            let result = SettlementResult {
                amount_spent: spent,
                amount_received: received,
                surplus: received - amount_out,
            };
            debug!(
                input = %input_token,
                output = %output_token,
                spent = %result.amount_spent,
                received = %result.amount_received,
                surplus = %result.surplus,
                "Swap settled"
            );
            Ok(result)
        })
    }
}
