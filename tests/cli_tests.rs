//! CLI integration tests.

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const BUNDLED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/simulation.toml");

fn leverkit() -> Command {
    cargo_bin_cmd!("leverkit")
}

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_help() {
    leverkit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("leverkit"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_check_config_prints_summary() {
    leverkit()
        .args(["check", "config", "--config", BUNDLED])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("WETH / USDC"))
        .stdout(predicate::str::contains("target 30000"));
}

#[test]
fn test_check_config_rejects_bad_bounds() {
    let file = write_temp_config(
        "[vault]\ntarget_leverage_bps = 30000\nlower_bound_leverage_bps = 31000\n",
    );
    leverkit()
        .args(["check", "config", "--config"])
        .arg(file.path())
        .assert()
        .failure();
}

#[test]
fn test_missing_config_fails() {
    leverkit()
        .args(["simulate", "--config", "/nonexistent/leverkit.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_simulate_prints_tables() {
    leverkit()
        .args(["simulate", "--config", BUNDLED, "--log-level", "error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Steps"))
        .stdout(predicate::str::contains("rebalance"))
        .stdout(predicate::str::contains("reverted"))
        .stdout(predicate::str::contains("1 of 8 steps reverted"));
}

#[test]
fn test_simulate_json_is_parseable() {
    let output = leverkit()
        .args(["simulate", "--json", "--log-level", "off", "--config", BUNDLED])
        .output()
        .expect("run leverkit");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["steps"].as_array().map(Vec::len), Some(8));
    assert_eq!(report["steps"][5]["ok"], serde_json::Value::Bool(false));
    assert_eq!(report["vault"]["too_imbalanced"], serde_json::Value::Bool(false));
}
