//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Every collaborator the vault and its orchestrators talk to is reached
//! through one of these traits. The crate ships in-memory implementations in
//! [`crate::adapter`]; a chain-backed deployment would provide its own.
//!
//! # Available Ports
//!
//! - [`LendingPool`] - supply/borrow/repay/withdraw of the pooled position
//! - [`PriceOracle`] - base-currency prices
//! - [`FlashLender`], [`FlashBorrower`] - ERC-3156 style flash loans
//! - [`Venue`] - opaque trading venue reached with pre-built calldata
//! - [`SwapExecutor`] - the execution hook wrapped by swap settlement

mod flash;
mod oracle;
mod pool;
mod swap;
mod venue;

pub use flash::{callback_success, FlashBorrower, FlashLender};
pub use oracle::{PriceOracle, PRICE_DECIMALS};
pub use pool::LendingPool;
pub use swap::{SwapExecutor, SwapRequest};
pub use venue::Venue;
