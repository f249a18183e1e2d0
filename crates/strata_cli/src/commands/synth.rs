//! Synth command - Construct all stacks and write templates.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use strata_core::SynthReport;

use super::ConfigArgs;
use crate::stacks;

#[derive(Args)]
pub struct SynthArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output directory for templates and the manifest
    #[arg(short, long, default_value = "cdk.out")]
    pub out: PathBuf,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    let report = run(&args)?;

    println!("Synthesized {} stacks to {}", report.manifest.stacks.len(), report.out_dir.display());
    for stack in &report.manifest.stacks {
        println!(
            "   {} ({} resources) -> {}",
            stack.stack_name, stack.resource_count, stack.template_file
        );
    }
    if report.flushed > 0 {
        println!("Persisted {} values to the parameter store", report.flushed);
    }
    Ok(())
}

/// Build a context, construct every stack and synthesize.
pub fn run(args: &SynthArgs) -> Result<SynthReport> {
    let mut ctx = args.config.context()?;
    stacks::instantiate(&mut ctx)?;

    let report = ctx
        .synthesize(&args.out)
        .with_context(|| format!("Failed to synthesize into {}", args.out.display()))?;

    info!("Run {} finished", report.manifest.run_id);
    Ok(report)
}
