//! `leverkit simulate`: run a script and print the report.

use std::path::Path;

use tabled::{Table, Tabled};

use crate::app::{Simulation, SimulationConfig, SimulationReport};
use crate::cli::output;
use crate::error::Result;

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Result")]
    result: &'static str,
    #[tabled(rename = "Leverage")]
    leverage: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "Account")]
    name: String,
    #[tabled(rename = "Collateral")]
    collateral: String,
    #[tabled(rename = "Debt")]
    debt: String,
    #[tabled(rename = "Shares")]
    shares: String,
}

/// Load `config_path`, run it and print the report.
pub fn execute<P: AsRef<Path>>(config_path: P, json: bool, log_level: Option<&str>) -> Result<()> {
    let mut config = SimulationConfig::load(config_path)?;
    if let Some(level) = log_level {
        config.logging.level = level.to_string();
    }
    config.logging.init();

    let report = Simulation::new(&config)?.run()?;
    if json {
        // Serializing plain data with string keys cannot fail.
        let rendered = serde_json::to_string_pretty(&report).unwrap_or_default();
        println!("{rendered}");
    } else {
        print_tables(&report);
    }
    Ok(())
}

fn print_tables(report: &SimulationReport) {
    output::section("Steps");
    let rows = report.steps.iter().map(|s| StepRow {
        index: s.index,
        action: s.action,
        account: s.account.clone().unwrap_or_default(),
        result: if s.ok { "ok" } else { "reverted" },
        leverage: format!("{}x", s.leverage.round_dp(4)),
        detail: s.detail.clone(),
    });
    output::table(&Table::new(rows).to_string());

    output::section("Vault");
    let vault = &report.vault;
    output::key_value("Leverage", format!("{} bps", vault.leverage_bps));
    output::key_value("Collateral", vault.collateral);
    output::key_value("Debt", vault.debt);
    output::key_value("Net assets", vault.net_assets);
    output::key_value("Share supply", vault.total_supply);
    if vault.too_imbalanced {
        output::status(false, "Vault is outside its leverage bounds");
    }

    if !report.accounts.is_empty() {
        output::section("Accounts");
        let rows = report.accounts.iter().map(|a| AccountRow {
            name: a.name.clone(),
            collateral: a.collateral.to_string(),
            debt: a.debt.to_string(),
            shares: a.shares.to_string(),
        });
        output::table(&Table::new(rows).to_string());
    }

    let failed = report.failed_steps();
    println!();
    if failed == 0 {
        output::status(true, &format!("{} steps completed", report.steps.len()));
    } else {
        output::status(false, &format!("{failed} of {} steps reverted", report.steps.len()));
    }
}
