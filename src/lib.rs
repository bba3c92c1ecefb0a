//! Leverkit - leveraged yield vault with flash-loan orchestrated flows.
//!
//! A vault holds collateral supplied to a lending pool and borrows a debt
//! asset against it, keeping its leverage inside configured bounds. Users
//! enter and exit through orchestrators that flash-borrow the debt side,
//! swap through a venue and settle everything in one atomic step.
//!
//! # Architecture
//!
//! - **`ledger`** - Token balances, allowances and atomic rollback
//! - **`domain`** - Fixed-point math, positions and token amounts
//! - **`port`** - Traits for the external collaborators (pool, oracle,
//!   flash lender, swap venue)
//! - **`adapter`** - In-memory implementations of the ports
//! - **`settlement`** - Bounded exact-output swaps through an untrusted venue
//! - **`vault`** - Share accounting, leverage bounds and rebalance subsidies
//! - **`orchestrator`** - Deposit, withdraw and rebalance flows driven by
//!   flash loans
//! - **`app`** - Simulation config, environment wiring and logging
//! - **`cli`** - The `leverkit` command line
//!
//! # Example
//!
//! ```no_run
//! use leverkit::app::{Simulation, SimulationConfig};
//!
//! let config = SimulationConfig::load("simulation.toml")?;
//! let report = Simulation::new(&config)?.run()?;
//! println!("{} steps failed", report.failed_steps());
//! # Ok::<(), leverkit::Error>(())
//! ```

pub mod adapter;
pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod port;
pub mod settlement;
pub mod vault;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
