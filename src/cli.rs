use clap::error::ErrorKind;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "desk-sim",
    version,
    about = "Discrete-event simulation of a staffed counselling desk"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the configured replications and report the results
    Run(RunArgs),
    /// Validate a configuration and print the expanded roster
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long)]
    pub replications: Option<usize>,
    #[arg(long, help = "Base seed; replication i uses seeds derived from (seed, i)")]
    pub seed: Option<u64>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(
        long,
        help = "File with one interarrival gap (minutes) per line; replaces the configured arrivals"
    )]
    pub interarrivals: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
    #[arg(long, help = "Cancel outstanding replications after the first failure")]
    pub abort_on_failure: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowConfigArgs {
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Summary,
    Json,
}

pub fn parse_args() -> Result<Cli> {
    match Cli::try_parse() {
        Ok(cli) => Ok(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => Err(Error::Cli(err.to_string())),
    }
}
