//! Settable price oracle with heartbeat staleness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{OracleError, Result};
use crate::port::PriceOracle;

#[derive(Debug, Clone, Copy)]
struct Feed {
    price: U256,
    updated_at: u64,
}

/// Oracle whose prices are set by hand. Time is a plain counter advanced by
/// the caller; with a heartbeat set, a feed older than the heartbeat is stale.
#[derive(Debug, Default)]
pub struct StaticOracle {
    feeds: Mutex<HashMap<Address, Feed>>,
    now: AtomicU64,
    heartbeat: Option<u64>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_heartbeat(mut self, seconds: u64) -> Self {
        self.heartbeat = Some(seconds);
        self
    }

    /// Publish `price` for `token` as of now.
    pub fn set_price(&self, token: Address, price: U256) {
        self.set_price_at(token, price, self.now());
    }

    pub fn set_price_at(&self, token: Address, price: U256, updated_at: u64) {
        debug!(%token, %price, updated_at, "Price update");
        self.feeds
            .lock()
            .insert(token, Feed { price, updated_at });
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl PriceOracle for StaticOracle {
    fn asset_price(&self, token: Address) -> Result<U256> {
        let feed = self
            .feeds
            .lock()
            .get(&token)
            .copied()
            .ok_or(OracleError::MissingFeed { token })?;
        if feed.price.is_zero() {
            return Err(OracleError::ZeroPrice { token }.into());
        }
        if let Some(heartbeat) = self.heartbeat {
            let now = self.now();
            if now.saturating_sub(feed.updated_at) > heartbeat {
                return Err(OracleError::StalePrice {
                    token,
                    updated_at: feed.updated_at,
                    now,
                    heartbeat,
                }
                .into());
            }
        }
        Ok(feed.price)
    }
}
