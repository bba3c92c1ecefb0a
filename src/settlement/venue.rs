//! Swap executor for an opaque router venue.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::error::{Result, SwapError};
use crate::ledger::Ledger;
use crate::port::{SwapExecutor, SwapRequest, Venue};

/// Executes pre-built venue calldata on behalf of a fixed holder.
///
/// The venue is bound once at construction; there is no runtime selection by
/// name. Approval is scoped to `amount_in_maximum` for the duration of the call
/// and revoked afterwards.
pub struct VenueAdapter {
    holder: Address,
    ledger: Arc<Ledger>,
    venue: Arc<dyn Venue>,
}

impl VenueAdapter {
    pub fn new(holder: Address, ledger: Arc<Ledger>, venue: Arc<dyn Venue>) -> Self {
        Self {
            holder,
            ledger,
            venue,
        }
    }

    /// Router address input tokens are approved to.
    pub fn venue_address(&self) -> Address {
        self.venue.address()
    }
}

impl SwapExecutor for VenueAdapter {
    fn execute(&self, request: &SwapRequest) -> Result<U256> {
        let router = self.venue.address();

        self.ledger.transact(|| {
            let input_before = self.ledger.balance_of(request.input_token, self.holder);
            let output_before = self.ledger.balance_of(request.output_token, self.holder);

            self.ledger.approve(
                request.input_token,
                self.holder,
                router,
                request.amount_in_maximum,
            )?;
            self.venue.call(self.holder, &request.payload)?;
            self.ledger
                .approve(request.input_token, self.holder, router, U256::ZERO)?;

            // The call "succeeding" says nothing about what arrived.
            let output_after = self.ledger.balance_of(request.output_token, self.holder);
            let received = output_after.saturating_sub(output_before);
            if received < request.amount_out {
                return Err(SwapError::InsufficientOutput {
                    received,
                    expected: request.amount_out,
                }
                .into());
            }

            let surplus = received - request.amount_out;
            if !surplus.is_zero() && request.receiver != self.holder {
                self.ledger.transfer(
                    request.output_token,
                    self.holder,
                    request.receiver,
                    surplus,
                )?;
                info!(
                    token = %request.output_token,
                    receiver = %request.receiver,
                    %surplus,
                    "Forwarded swap surplus"
                );
            }

            let input_after = self.ledger.balance_of(request.input_token, self.holder);
            let spent = input_before.saturating_sub(input_after);
            debug!(%router, %spent, %received, "Venue call complete");
            Ok(spent)
        })
    }
}
