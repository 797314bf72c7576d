//! Shared utilities for CLI commands.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use slumber_core::{DayClock, RawEventRow, normalize_date};

use crate::config::Config;
use crate::input;

/// Pre-compiled regex for relative date parsing.
static RELATIVE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(day|week)s?\s+ago$").unwrap());

/// Conservative bound for relative date parsing (~1000 years in days).
const MAX_RELATIVE_DAYS: i64 = 1000 * 365;

/// Parse a date string relative to `today`.
///
/// Supports:
/// - Calendar dates: "2024-01-15", "2024/01/15", "01/15/2024"
/// - Keywords: "today", "yesterday"
/// - Relative: "3 days ago", "1 week ago"
pub fn parse_date(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(date) = normalize_date(s) {
        return Ok(date);
    }

    let Some(caps) = RELATIVE_DATE_RE.captures(s) else {
        anyhow::bail!(
            "Invalid date: {s}. Use YYYY-MM-DD, 'today', 'yesterday' or relative (e.g., '3 days ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;

    let (max_for_unit, days_per_unit) = match &caps[2] {
        "day" => (MAX_RELATIVE_DAYS, 1),
        "week" => (MAX_RELATIVE_DAYS / 7, 7),
        unit => anyhow::bail!("Unknown date unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative date value too large: {n} {}", &caps[2]);
    }

    Ok(today - Duration::days(n * days_per_unit))
}

/// Today's date on the given clock.
pub fn today(clock: &DayClock) -> NaiveDate {
    clock.date_of(Utc::now())
}

/// Formats whole minutes as "Xh Ym" or "Ym".
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours >= 1 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

/// Whole minutes of a fractional duration, rounded half away from zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn whole_minutes(minutes: f64) -> u32 {
    minutes.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Formats a minute-of-day index as "HH:MM"; the end of the day is "24:00".
pub fn format_minute_of_day(minute: usize) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Loads rows from `input`, or from the configured snapshot when absent.
pub fn load_input(input: Option<&Path>, config: &Config) -> anyhow::Result<Vec<RawEventRow>> {
    let path = input.unwrap_or(&config.input_path);
    input::load_rows(path)
}
