use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::PollOverrides;
use crate::form::Criterion;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a saved results table and print its venues as JSON.
    Parse(ParseArgs),
    /// Run a full search against a fixture form and print the schedule.
    Search(SearchArgs),
    /// Serve JSON-lines requests on stdin against a fixture form.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// HTML file holding the rendered results table.
    #[arg(long)]
    pub html: PathBuf,

    /// Keep only venues with at least one open slot.
    #[arg(long)]
    pub bookable_only: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// YAML fixture describing the booking form.
    #[arg(long)]
    pub fixture: PathBuf,

    /// Search criterion to select before searching (e.g. `facility-type=TENNIS`).
    #[arg(long = "set", value_name = "CRITERION=VALUE", value_parser = parse_criterion_value)]
    pub criteria: Vec<(Criterion, String)>,

    /// Keep only venues with at least one open slot.
    #[arg(long)]
    pub bookable_only: bool,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// YAML fixture describing the booking form.
    #[arg(long)]
    pub fixture: PathBuf,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct PollArgs {
    /// Delay between readiness checks (overrides FACILITY_CHECK_POLL_INTERVAL_MS).
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Readiness checks before giving up (overrides FACILITY_CHECK_POLL_MAX_TRIALS).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_trials: Option<u32>,
}

impl From<PollArgs> for PollOverrides {
    fn from(args: PollArgs) -> Self {
        Self {
            interval_ms: args.interval_ms,
            max_trials: args.max_trials,
        }
    }
}

fn parse_criterion_value(raw: &str) -> anyhow::Result<(Criterion, String)> {
    let Some((criterion, value)) = raw.split_once('=') else {
        anyhow::bail!("expected CRITERION=VALUE, got {raw:?}");
    };
    Ok((criterion.parse()?, value.trim().to_owned()))
}
