use std::path::Path;

use crate::app::{Environment, SimulationConfig};
use crate::cli::output;
use crate::error::Result;

/// Validate a simulation file and build its environment without running
/// any steps.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());

    let config = SimulationConfig::load(path)?;
    output::status(true, "Configuration file is valid");

    let env = Environment::build(&config)?;
    output::status(true, "Vault and collaborators deployed");

    let vault = env.vault.config();
    output::section("Summary");
    output::key_value(
        "Market",
        format!(
            "{} / {}",
            config.market.collateral.symbol, config.market.debt.symbol
        ),
    );
    output::key_value(
        "Leverage",
        format!(
            "target {} in [{}, {}] bps",
            vault.target_leverage_bps, vault.lower_bound_leverage_bps, vault.upper_bound_leverage_bps
        ),
    );
    output::key_value("Max subsidy", format!("{} bps", vault.max_subsidy_bps));
    output::key_value("Flash fee", format!("{} bps", config.lender.fee_bps));
    output::key_value("Steps", config.steps.len());
    if config.steps.is_empty() {
        output::status(false, "No steps configured; simulate will only report the empty vault");
    }
    Ok(())
}
