//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`fixture`] - a default 3x WETH/USDC [`Environment`](crate::app::Environment)
//!   with amount and balance helpers.
//! - [`rogue`] - a flash lender that tampers with its callback arguments.

pub mod fixture;
pub mod rogue;

pub use fixture::Fixture;
pub use rogue::{RogueLender, Tamper};
