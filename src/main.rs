//! Breakwater CLI entry point

use anyhow::{Context, Result};
use clap::Parser;

use breakwater::cli::{commands, Cli, Commands};
use breakwater::infrastructure::config::ConfigLoader;
use breakwater::infrastructure::logging::Logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let _logging = Logging::init(&config.logging).context("Failed to initialize logging")?;

    let exit_code = match &cli.command {
        Commands::Hook(args) => commands::hook::handle_hook(args)?,
        Commands::Drift(args) => {
            commands::drift::handle_drift(args, &config.drift, cli.json).await?
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
