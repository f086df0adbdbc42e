//! Command-line interface for robot-health
//!
//! robot-run takes its argv as a workload command line and is not parsed
//! here.

use clap::Parser;
use std::path::PathBuf;

/// robot-health - container health probe for robot workloads
#[derive(Parser, Debug)]
#[command(name = "robot-health")]
#[command(author, version, about, long_about = None)]
pub struct HealthCli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workload pattern, overriding the configured one
    #[arg(short, long, conflicts_with = "no_process_check")]
    pub pattern: Option<String>,

    /// Skip the process-table check
    #[arg(long)]
    pub no_process_check: bool,

    /// Output the report in JSON format
    #[arg(long)]
    pub json: bool,

    /// Print the Dockerfile HEALTHCHECK instruction and exit
    #[arg(long)]
    pub print_healthcheck: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl HealthCli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
