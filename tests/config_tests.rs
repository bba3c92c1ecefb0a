use std::io::Write;

use leverkit::app::{Asset, SimulationConfig, Step};
use leverkit::error::{ConfigError, Error};
use rust_decimal_macros::dec;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn bundled_simulation_file_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/simulation.toml");
    let config = SimulationConfig::load(path).unwrap();
    assert_eq!(config.market.collateral.symbol, "WETH");
    assert_eq!(config.venue.fee_bps, 5);
    assert!(config
        .steps
        .iter()
        .any(|step| matches!(step, Step::SetPrice { asset: Asset::Collateral, .. })));
}

#[test]
fn config_loads_from_disk() {
    let file = write_temp_config(
        r#"
[market]
collateral = { symbol = "WBTC", decimals = 8, price = "60000" }
debt = { symbol = "DAI", decimals = 18, price = "1" }

[vault]
target_leverage_bps = 20000
lower_bound_leverage_bps = 15000
upper_bound_leverage_bps = 25000

[[steps]]
action = "withdraw"
account = "alice"
shares = "0.5"
"#,
    );
    let config = SimulationConfig::load(file.path()).unwrap();
    assert_eq!(config.market.collateral.decimals, 8);
    assert_eq!(config.market.debt.price, dec!(1));
    assert_eq!(config.vault.target_leverage_bps, 20_000);
    assert_eq!(
        config.steps,
        vec![Step::Withdraw {
            account: "alice".into(),
            shares: Some(dec!(0.5)),
            slippage_bps: 100,
            min_receive: None,
        }]
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let err = SimulationConfig::load("/nonexistent/leverkit.toml").unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ReadFile(_))));
}

#[test]
fn config_rejects_matching_symbols() {
    let file = write_temp_config(
        r#"
[market]
collateral = { symbol = "USDC", decimals = 6, price = "1" }
debt = { symbol = "USDC", decimals = 6, price = "1" }
"#,
    );
    let err = SimulationConfig::load(file.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidValue { field: "market", .. })
    ));
}

#[test]
fn config_rejects_non_positive_step_price() {
    let file = write_temp_config(
        r#"
[[steps]]
action = "set_price"
asset = "debt"
price = "0"
"#,
    );
    let err = SimulationConfig::load(file.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidValue { field: "steps.price", .. })
    ));
}
