//! Command-line interface definitions.

pub mod check;
pub mod output;
pub mod simulate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Leverkit - leveraged vault simulator.
#[derive(Parser, Debug)]
#[command(name = "leverkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted simulation against in-memory collaborators
    Simulate(SimulateArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `leverkit check`
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate a simulation file and build its environment
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to simulation file
    #[arg(short, long, default_value = "simulation.toml")]
    pub config: PathBuf,
}

/// Arguments for `leverkit simulate`
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to simulation file
    #[arg(short, long, default_value = "simulation.toml")]
    pub config: PathBuf,

    /// Print the report as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Override the log level from the config file
    #[arg(long)]
    pub log_level: Option<String>,
}
