//! Strata CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Network topology error
//! - 4: Unresolved variable
//! - 5: Template error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata_cli::commands::{self, Cli, Commands};
use strata_cli::ExitCodes;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "strata=debug"
    } else if cli.quiet {
        "strata=warn"
    } else {
        "strata=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{},warn", default_level)));

    // Ignored when a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Stacks(args) => commands::stacks::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(ExitCodes::categorize(&e))
        }
    }
}
