use clap::Parser;

use leverkit::cli::{check, simulate, CheckCommand, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => {
            simulate::execute(&args.config, args.json, args.log_level.as_deref())?;
        }
        Commands::Check(CheckCommand::Config(args)) => {
            check::execute_config(&args.config)?;
        }
    }
    Ok(())
}
