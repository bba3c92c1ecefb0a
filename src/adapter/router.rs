//! Oracle-priced router venue with configurable misbehaviour.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolType};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::math::{self, Quote};
use crate::domain::ONE_HUNDRED_PERCENT_BPS;
use crate::error::{Result, SwapError};
use crate::ledger::Ledger;
use crate::port::{PriceOracle, Venue};

sol! {
    /// Exact-output order understood by [`SimulatedRouter`].
    #[sol(all_derives)]
    struct RouteOrder {
        address tokenIn;
        address tokenOut;
        uint256 amountOut;
        address recipient;
    }
}

/// How the router fills orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterBehavior {
    /// Charged on top of the oracle-fair input.
    pub fee_bps: u32,
    /// Share of `amountOut` actually delivered; 10000 is an honest fill.
    pub delivery_bps: u32,
    /// Deliver to this account instead of the order's recipient.
    pub misdirect_to: Option<Address>,
}

impl Default for RouterBehavior {
    fn default() -> Self {
        Self {
            fee_bps: 0,
            delivery_bps: ONE_HUNDRED_PERCENT_BPS,
            misdirect_to: None,
        }
    }
}

/// Code run mid-swap, after input is pulled and before output is delivered.
pub type ReentryHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Fills exact-output orders from its own inventory at oracle prices.
pub struct SimulatedRouter {
    address: Address,
    ledger: Arc<Ledger>,
    oracle: Arc<dyn PriceOracle>,
    behavior: Mutex<RouterBehavior>,
    hook: Mutex<Option<ReentryHook>>,
}

impl SimulatedRouter {
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<dyn PriceOracle>) -> Self {
        let address = ledger.new_address("router");
        Self {
            address,
            ledger,
            oracle,
            behavior: Mutex::new(RouterBehavior::default()),
            hook: Mutex::new(None),
        }
    }

    pub fn behavior(&self) -> RouterBehavior {
        *self.behavior.lock()
    }

    pub fn set_behavior(&self, behavior: RouterBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_reentry_hook(&self, hook: Option<ReentryHook>) {
        *self.hook.lock() = hook;
    }

    /// Calldata for an exact-output order delivering to `recipient`.
    pub fn order(token_in: Address, token_out: Address, amount_out: U256, recipient: Address) -> Bytes {
        let order = RouteOrder {
            tokenIn: token_in,
            tokenOut: token_out,
            amountOut: amount_out,
            recipient,
        };
        Bytes::from(<RouteOrder as SolType>::abi_encode(&order))
    }

    /// Input the router will pull for `amount_out`, fee included.
    pub fn quote_input(&self, token_in: Address, token_out: Address, amount_out: U256) -> Result<U256> {
        let input = Quote::new(
            self.oracle.asset_price(token_in)?,
            self.ledger.token(token_in)?.decimals,
        );
        let output = Quote::new(
            self.oracle.asset_price(token_out)?,
            self.ledger.token(token_out)?.decimals,
        );
        let fair = math::convert_up(amount_out, output, input)?;
        Ok(math::add_bps_up(fair, self.behavior().fee_bps)?)
    }
}

impl Venue for SimulatedRouter {
    fn address(&self) -> Address {
        self.address
    }

    fn call(&self, caller: Address, payload: &Bytes) -> Result<Bytes> {
        let order = <RouteOrder as SolType>::abi_decode(payload).map_err(|e| SwapError::VenueRejected {
            reason: e.to_string(),
        })?;
        if order.tokenIn == order.tokenOut {
            return Err(SwapError::VenueRejected {
                reason: "identical tokens".into(),
            }
            .into());
        }

        self.ledger.transact(|| {
            let input = self.quote_input(order.tokenIn, order.tokenOut, order.amountOut)?;
            self.ledger
                .transfer_from(order.tokenIn, self.address, caller, self.address, input)?;

            let hook = self.hook.lock().clone();
            if let Some(hook) = hook {
                debug!(router = %self.address, "Running reentry hook");
                hook()?;
            }

            let behavior = self.behavior();
            let delivered = math::mul_div(
                order.amountOut,
                U256::from(behavior.delivery_bps),
                U256::from(ONE_HUNDRED_PERCENT_BPS),
            )?;
            let to = behavior.misdirect_to.unwrap_or(order.recipient);
            let inventory = self.ledger.balance_of(order.tokenOut, self.address);
            if inventory < delivered {
                return Err(SwapError::VenueRejected {
                    reason: format!("inventory {inventory} below {delivered}"),
                }
                .into());
            }
            self.ledger
                .transfer(order.tokenOut, self.address, to, delivered)?;

            if delivered != order.amountOut || to != order.recipient {
                warn!(requested = %order.amountOut, %delivered, %to, "Router filled off-order");
            }
            debug!(%caller, %input, %delivered, "Router fill");
            Ok(Bytes::from(input.to_be_bytes::<32>().to_vec()))
        })
    }
}
