//! Validate command - Load and check configuration.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::ConfigArgs;
use crate::stacks;

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = args.config.load_config()?;
    let planned = stacks::plan(&config)?;

    for entry in &planned {
        stacks::check(&config, &entry.section)?;
    }

    info!("Configuration for {} is valid", config.project().prefix());
    println!("Configuration valid: {} ({} stacks)", config.project().prefix(), planned.len());
    for entry in &planned {
        println!("   {} <- Stack.{}", entry.canonical_name, entry.section);
    }
    Ok(())
}
