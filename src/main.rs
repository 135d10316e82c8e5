use anyhow::Result;
use clap::Parser;
use ethynyl::cli::commands::config::ConfigCommand;
use ethynyl::cli::commands::run::RunCommand;
use ethynyl::cli::commands::{show_how_to_start, Command};
use ethynyl::cli::{Cli, Commands};
use ethynyl::{config, init_config, init_telemetry, shutdown_telemetry, EthynylError};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config()?.clone();
    init_telemetry(&config.observability, cli.verbose)?;
    init_config()?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| EthynylError::ResourceExhaustion(format!("cannot start the task runtime: {e}")))?;

    let result = runtime.block_on(async {
        match cli.command {
            // Default behavior: no subcommand - explain how to start a run
            None => show_how_to_start().await,
            Some(Commands::Run {
                seed,
                atoms,
                carbon,
                hydrogen,
                format,
                output,
            }) => {
                RunCommand::new(seed, config)
                    .with_atoms(atoms)
                    .with_totals(carbon, hydrogen)
                    .with_format(format)
                    .with_output(output)
                    .execute()
                    .await
            }
            Some(Commands::Config) => ConfigCommand::new(config).execute().await,
        }
    });

    shutdown_telemetry();
    result
}
