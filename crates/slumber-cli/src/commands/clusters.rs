//! Clusters command: how overlapping sessions were resolved.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use slumber_core::{DateRange, DateScope, DayClock, Engine, ReconcileStats, Resolution};

use super::util::{self, format_minutes, parse_date, whole_minutes};
use crate::config::Config;

#[derive(Debug, Args)]
pub struct ClustersArgs {
    /// Row snapshot (JSON Lines or CSV, "-" for stdin).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// First day of the range, inclusive.
    #[arg(long, default_value = "6 days ago")]
    pub from: String,

    /// Last day of the range, inclusive.
    #[arg(long, default_value = "today")]
    pub to: String,
}

fn format_resolution(output: &mut String, index: usize, resolution: &Resolution, clock: &DayClock) {
    let shape = resolution.shape.map_or("single", |shape| shape.as_str());
    let count = resolution.cluster.len();
    let noun = if count == 1 { "session" } else { "sessions" };
    writeln!(output, "Cluster {index}: {count} {noun}, {shape}").unwrap();

    for session in resolution.cluster.sessions() {
        let marker = if *session == resolution.canonical { '*' } else { ' ' };
        writeln!(
            output,
            "  {marker} {} → {}  asleep {}  (stored {})",
            clock.format_datetime(session.start),
            clock.format_datetime(session.end),
            format_minutes(whole_minutes(session.total_asleep_min)),
            session.storage_date,
        )
        .unwrap();
    }

    for step in &resolution.walk {
        writeln!(
            output,
            "    gap {}-{}  score {}  {}",
            clock.format_time(step.gap_start),
            clock.format_time(step.gap_end),
            step.score,
            if step.extended { "extended" } else { "stopped" },
        )
        .unwrap();
    }
}

/// Formats cluster decisions touching `range` for terminal output.
pub fn format_clusters(
    range: &DateRange,
    resolutions: &[Resolution],
    stats: &ReconcileStats,
    clock: &DayClock,
) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "CLUSTERS: {} to {} (UTC{clock})",
        range.start(),
        range.end()
    )
    .unwrap();
    writeln!(output).unwrap();

    let shown: Vec<&Resolution> = resolutions
        .iter()
        .filter(|resolution| {
            resolution
                .cluster
                .sessions()
                .iter()
                .any(|session| range.contains(session.storage_date))
        })
        .collect();

    if shown.is_empty() {
        writeln!(output, "  No sessions in this range.").unwrap();
    }
    for (idx, resolution) in shown.iter().enumerate() {
        format_resolution(&mut output, idx + 1, resolution, clock);
        writeln!(output).unwrap();
    }
    if shown.is_empty() {
        writeln!(output).unwrap();
    }

    writeln!(
        output,
        "Rows: {} (dropped {}, duplicate stages {})",
        stats.rows, stats.dropped, stats.duplicate_stages
    )
    .unwrap();
    writeln!(
        output,
        "Sessions: {} (superseded by stages {})",
        stats.sessions, stats.superseded_sessions
    )
    .unwrap();
    writeln!(
        output,
        "Clusters: {}   Stage episodes: {}",
        stats.clusters, stats.stage_episodes
    )
    .unwrap();

    output
}

/// Runs the clusters command.
pub fn run<W: Write>(writer: &mut W, args: &ClustersArgs, config: &Config) -> Result<()> {
    let engine_config = config.engine_config().context("invalid configuration")?;
    let clock = engine_config.clock;
    let today = util::today(&clock);
    let range = DateRange::new(parse_date(&args.from, today)?, parse_date(&args.to, today)?)
        .context("invalid date range")?;
    let rows = util::load_input(args.input.as_deref(), config)?;

    let reconciliation = Engine::new(engine_config).reconcile(&rows, &range);
    write!(
        writer,
        "{}",
        format_clusters(
            &range,
            reconciliation.resolutions(),
            &reconciliation.stats(),
            &clock
        )
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use insta::assert_snapshot;
    use serde_json::json;
    use slumber_core::{EngineConfig, RawEventRow};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Two nested sessions plus heart rate over the leading gap.
    fn nested_rows(bpm: f64) -> Vec<RawEventRow> {
        let mut rows: Vec<RawEventRow> = [
            ("2024-01-14T22:00:00Z", "2024-01-15T02:00:00Z", 4.0),
            ("2024-01-14T23:00:00Z", "2024-01-15T01:00:00Z", 2.0),
        ]
        .into_iter()
        .map(|(start, end, total)| RawEventRow {
            display_timestamp: end.to_string(),
            display_date: "2024-01-15".to_string(),
            metric_kind: "sleep_session".to_string(),
            numeric_value: None,
            raw_payload: json!({ "start": start, "end": end, "totalSleep": total }),
        })
        .collect();

        let gap_start = Utc.with_ymd_and_hms(2024, 1, 14, 22, 0, 0).unwrap();
        for i in 0..12 {
            let instant = gap_start + Duration::minutes(5 * i);
            rows.push(RawEventRow {
                display_timestamp: instant.format("%Y-%m-%d %H:%M:%S").to_string(),
                display_date: "2024-01-14".to_string(),
                metric_kind: "heart_rate".to_string(),
                numeric_value: Some(bpm),
                raw_payload: serde_json::Value::Null,
            });
        }
        rows
    }

    fn render(rows: &[RawEventRow], range: &DateRange) -> String {
        let reconciliation = Engine::new(EngineConfig::default()).reconcile(rows, range);
        format_clusters(
            range,
            reconciliation.resolutions(),
            &reconciliation.stats(),
            &DayClock::utc(),
        )
    }

    #[test]
    fn test_calm_gap_extends_to_outer_session() {
        let range = DateRange::new(date(15), date(15)).unwrap();
        let output = render(&nested_rows(50.0), &range);

        assert_snapshot!(output.trim_end(), @r"
        CLUSTERS: 2024-01-15 to 2024-01-15 (UTC+00:00)

        Cluster 1: 2 sessions, nested
          * 2024-01-14 22:00 → 2024-01-15 02:00  asleep 4h 0m  (stored 2024-01-15)
            2024-01-14 23:00 → 2024-01-15 01:00  asleep 2h 0m  (stored 2024-01-15)
            gap 22:00-23:00  score 0  extended

        Rows: 14 (dropped 0, duplicate stages 0)
        Sessions: 2 (superseded by stages 0)
        Clusters: 1   Stage episodes: 0
        ");
    }

    #[test]
    fn test_elevated_gap_keeps_inner_session() {
        let range = DateRange::new(date(15), date(15)).unwrap();
        let output = render(&nested_rows(95.0), &range);

        assert!(output.contains("    gap 22:00-23:00  score 3  stopped\n"));
        assert!(output.contains("  * 2024-01-14 23:00 → 2024-01-15 01:00"));
        assert!(output.contains("    2024-01-14 22:00 → 2024-01-15 02:00"));
    }

    #[test]
    fn test_out_of_range_clusters_are_hidden() {
        let range = DateRange::new(date(1), date(2)).unwrap();
        let output = render(&nested_rows(50.0), &range);

        assert!(output.contains("  No sessions in this range.\n\nRows: 14"));
    }
}
