//! `digestflow` -- operator binary for the channel digest pipeline.
//!
//! - `digestflow synth` -- print the synthesized resource graph as JSON.
//! - `digestflow plan` -- print what a first deploy would create.
//! - `digestflow simulate` -- deploy into an in-process platform and run the
//!   schedule for a number of days.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use digestflow_deploy::DescriptorConfig;

pub mod commands;

#[derive(Debug, Parser)]
#[command(name = "digestflow", about = "Scheduled channel digest pipeline", version)]
pub struct Cli {
    /// Descriptor file (TOML). Built-in defaults apply when omitted.
    #[arg(short, long, global = true, env = "DIGESTFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the synthesized resource graph as JSON.
    Synth,

    /// Print the changes a first deploy would make.
    Plan,

    /// Deploy into a simulated platform and run the schedule.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of days to run.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=366))]
    pub days: u32,

    /// Start instant (RFC 3339). Defaults to today, 00:00 UTC.
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Leave every subscription pending confirmation.
    #[arg(long)]
    pub unconfirmed: bool,
}

/// Execute a parsed command line, writing results to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = DescriptorConfig::resolve(cli.config.as_deref()).context("loading descriptor")?;
    match &cli.command {
        Command::Synth => commands::synth(&config, out),
        Command::Plan => commands::plan(&config, out),
        Command::Simulate(args) => commands::simulate(&config, args, out),
    }
}
