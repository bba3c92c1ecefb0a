//! Application layer: simulation config, logging, environment wiring and the
//! scripted runner behind the CLI.

pub mod config;
pub mod environment;
pub mod logging;
pub mod simulate;

pub use config::{
    AssetConfig, Asset, LenderConfig, MarketConfig, PoolConfig, SimulationConfig, Step,
    VaultSettings, VenueConfig,
};
pub use environment::Environment;
pub use logging::LoggingConfig;
pub use simulate::{AccountBalance, Simulation, SimulationReport, StepOutcome, VaultSnapshot};
