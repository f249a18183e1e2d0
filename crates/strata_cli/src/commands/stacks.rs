//! Stacks command - List stacks in instantiation order.

use anyhow::Result;
use clap::Args;

use super::ConfigArgs;
use crate::stacks;

#[derive(Args)]
pub struct StacksArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: StacksArgs) -> Result<()> {
    let config = args.config.load_config()?;
    let planned = stacks::plan(&config)?;

    if args.json {
        let names: Vec<&str> = planned.iter().map(|p| p.canonical_name.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for entry in &planned {
            println!("{}", entry.canonical_name);
        }
    }
    Ok(())
}
