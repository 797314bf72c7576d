//! Summary command: per-day totals over a date range.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use slumber_core::{DateRange, DayClock, DayTotals, Engine};

use super::util::{self, format_minutes, parse_date};
use crate::config::Config;

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Row snapshot (JSON Lines or CSV, "-" for stdin).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// First day of the range, inclusive.
    #[arg(long, default_value = "6 days ago")]
    pub from: String,

    /// Last day of the range, inclusive.
    #[arg(long, default_value = "today")]
    pub to: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Formats per-day totals for terminal output.
pub fn format_summary(
    range: &DateRange,
    totals: &BTreeMap<NaiveDate, DayTotals>,
    clock: &DayClock,
) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "SLEEP SUMMARY: {} to {} (UTC{clock})",
        range.start(),
        range.end()
    )
    .unwrap();
    writeln!(output).unwrap();

    if totals.is_empty() {
        writeln!(output, "  No sleep recorded in this range.").unwrap();
        return output;
    }

    writeln!(
        output,
        "  {:<10}  {:<8}  {:<8}  {:<8}  {:<8}  Awake",
        "Date", "Asleep", "Deep", "REM", "Core"
    )
    .unwrap();
    for (date, day) in totals {
        writeln!(
            output,
            "  {date}  {:<8}  {:<8}  {:<8}  {:<8}  {}",
            format_minutes(day.total_min),
            format_minutes(day.deep_min),
            format_minutes(day.rem_min),
            format_minutes(day.core_min),
            format_minutes(day.awake_min),
        )
        .unwrap();
    }

    let nights = u32::try_from(totals.len()).unwrap_or(u32::MAX);
    let sum: u32 = totals.values().map(|day| day.total_min).sum();
    let average = (sum + nights / 2) / nights;
    writeln!(output).unwrap();
    writeln!(
        output,
        "  Nights: {nights}   Average: {}",
        format_minutes(average)
    )
    .unwrap();

    output
}

/// Formats per-day totals as JSON, keyed by ISO date.
pub fn format_summary_json(totals: &BTreeMap<NaiveDate, DayTotals>) -> Result<String> {
    Ok(serde_json::to_string_pretty(totals)?)
}

/// Runs the summary command.
pub fn run<W: Write>(writer: &mut W, args: &SummaryArgs, config: &Config) -> Result<()> {
    let engine_config = config.engine_config().context("invalid configuration")?;
    let clock = engine_config.clock;
    let today = util::today(&clock);
    let range = DateRange::new(parse_date(&args.from, today)?, parse_date(&args.to, today)?)
        .context("invalid date range")?;
    let rows = util::load_input(args.input.as_deref(), config)?;

    let totals = Engine::new(engine_config).reconcile(&rows, &range).totals();

    if args.json {
        writeln!(writer, "{}", format_summary_json(&totals)?)?;
    } else {
        write!(writer, "{}", format_summary(&range, &totals, &clock))?;
    }
    Ok(())
}
