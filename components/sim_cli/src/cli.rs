//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

/// Drives a pool of scripted ships for a number of ticks.
#[derive(Parser, Debug, Clone)]
#[command(name = "starcode-sim", version, about = "Scripted ship scheduling simulator", long_about = None)]
pub struct Cli {
    /// Number of well-behaved agents
    #[arg(long, default_value_t = 8)]
    pub agents: usize,

    /// Number of agents whose script never yields
    #[arg(long, default_value_t = 0)]
    pub runaway: usize,

    /// Pool worker threads
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Round budget per agent, in milliseconds
    #[arg(long = "budget-ms", default_value_t = 50)]
    pub budget_ms: u64,

    /// Number of ticks to run
    #[arg(long, default_value_t = 10)]
    pub ticks: u64,

    /// Boot script for the well-behaved agents
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Print a summary line per tick
    #[arg(long, short)]
    pub verbose: bool,
}
