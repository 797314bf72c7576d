//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{clusters::ClustersArgs, day::DayArgs, summary::SummaryArgs};

/// Sleep timeline reconciliation.
///
/// Reads an exported snapshot of wearable event rows and reconciles
/// overlapping sleep reports into one timeline per day.
#[derive(Debug, Parser)]
#[command(name = "slumber", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the minute-level timeline for one day.
    Day(DayArgs),

    /// Show per-day totals over a date range.
    Summary(SummaryArgs),

    /// Show how overlapping sessions were resolved.
    Clusters(ClustersArgs),
}
