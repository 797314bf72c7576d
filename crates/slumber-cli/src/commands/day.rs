//! Day command: the minute-level timeline for one date.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use slumber_core::{DayClock, DayTimeline, Engine, SingleDay, SlotTag};

use super::util::{self, format_minute_of_day, format_minutes, parse_date, whole_minutes};
use crate::config::Config;

#[derive(Debug, Args)]
pub struct DayArgs {
    /// Row snapshot (JSON Lines or CSV, "-" for stdin).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Day to show (YYYY-MM-DD, "today", "yesterday", "N days ago").
    #[arg(short, long, default_value = "today")]
    pub date: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// One character per hour: full when at least half the hour is asleep.
fn hour_bar(timeline: &DayTimeline) -> String {
    timeline
        .slots
        .chunks(60)
        .map(|hour| match hour.iter().filter(|s| **s == SlotTag::Asleep).count() {
            0 => '░',
            n if n >= 30 => '█',
            _ => '▄',
        })
        .collect()
}

/// Formats a timeline for terminal output.
pub fn format_day(timeline: &DayTimeline, clock: &DayClock) -> String {
    let mut output = String::new();
    let totals = &timeline.totals;

    writeln!(output, "SLEEP: {} (UTC{clock})", timeline.date).unwrap();
    writeln!(output).unwrap();
    writeln!(output, "  00    06    12    18").unwrap();
    writeln!(output, "  {}", hour_bar(timeline)).unwrap();
    writeln!(output).unwrap();
    writeln!(output, "TOTALS").unwrap();
    writeln!(output, "──────").unwrap();
    writeln!(output, "  Asleep: {}", format_minutes(totals.total_min)).unwrap();
    writeln!(output, "  Deep:   {}", format_minutes(totals.deep_min)).unwrap();
    writeln!(output, "  REM:    {}", format_minutes(totals.rem_min)).unwrap();
    writeln!(output, "  Core:   {}", format_minutes(totals.core_min)).unwrap();
    writeln!(output, "  Awake:  {}", format_minutes(totals.awake_min)).unwrap();
    writeln!(output).unwrap();
    writeln!(output, "BLOCKS").unwrap();
    writeln!(output, "──────").unwrap();

    if timeline.blocks.is_empty() {
        writeln!(output, "  No sleep recorded.").unwrap();
        return output;
    }

    for block in &timeline.blocks {
        write!(
            output,
            "  {}-{}  {:<7}  {} → {}  ({})",
            format_minute_of_day(block.start_minute),
            format_minute_of_day(block.end_minute),
            block.origin.as_str(),
            clock.format_datetime(block.origin_start),
            clock.format_datetime(block.origin_end),
            format_minutes(whole_minutes(block.full_duration_min)),
        )
        .unwrap();
        if block.spillover {
            write!(output, "  spillover, not counted").unwrap();
        }
        writeln!(output).unwrap();
    }

    output
}

/// Formats a timeline as JSON.
pub fn format_day_json(timeline: &DayTimeline) -> Result<String> {
    Ok(serde_json::to_string(timeline)?)
}

/// Runs the day command.
pub fn run<W: Write>(writer: &mut W, args: &DayArgs, config: &Config) -> Result<()> {
    let engine_config = config.engine_config().context("invalid configuration")?;
    let clock = engine_config.clock;
    let date = parse_date(&args.date, util::today(&clock))?;
    let rows = util::load_input(args.input.as_deref(), config)?;

    let engine = Engine::new(engine_config);
    let scope = SingleDay(date);
    let timeline = engine.reconcile(&rows, &scope).timeline(date);

    if args.json {
        writeln!(writer, "{}", format_day_json(&timeline)?)?;
    } else {
        write!(writer, "{}", format_day(&timeline, &clock))?;
    }
    Ok(())
}
