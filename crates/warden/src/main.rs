mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    operon_control::init_logging();

    // Parse CLI args
    let cli = Cli::parse();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(&config::expand_path(path));
    }

    // Load config
    let config = config::load_config(cli.config.as_deref())?;

    // Dispatch to command
    match cli.command {
        Commands::Init { .. } => {
            // Already handled above
            unreachable!()
        }
        Commands::Status { scope } => {
            commands::status::execute(scope.as_deref(), &config)?;
        }
        Commands::Admit {
            scope,
            tokens,
            cost,
        } => {
            commands::admit::execute(&scope, tokens, cost, &config)?;
        }
        Commands::Simulate {
            scope,
            target,
            calls,
            tokens,
            cost,
            interval_ms,
        } => {
            let options = commands::simulate::SimulateOptions {
                scope,
                target,
                calls,
                tokens,
                cost,
                interval_ms,
            };
            commands::simulate::execute(options, &config).await?;
        }
    }

    Ok(())
}
