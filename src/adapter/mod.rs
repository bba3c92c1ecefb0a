//! In-memory implementations of the ports.
//!
//! These are faithful enough collaborators to drive the vault and its
//! orchestrators end to end: the simulator CLI runs on them and so do the
//! tests. Each keeps its state on the shared [`Ledger`](crate::ledger::Ledger),
//! so a revert anywhere in a flow unwinds their changes too.

mod flash;
mod oracle;
mod pool;
mod router;

pub use flash::InMemoryFlashLender;
pub use oracle::StaticOracle;
pub use pool::InMemoryLendingPool;
pub use router::{ReentryHook, RouteOrder, RouterBehavior, SimulatedRouter};
