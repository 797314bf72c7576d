//! Loading row snapshots from exported files.
//!
//! Two layouts are accepted:
//! - JSON Lines, one row object per line (`displayTimestamp`, `displayDate`,
//!   `metricKind`, `numericValue`, `rawPayload`)
//! - CSV with the same column names, `rawPayload` holding JSON text
//!
//! A path of `-` reads JSON Lines from stdin.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use slumber_core::RawEventRow;

/// Loads every row from `path`, choosing the layout by extension.
pub fn load_rows(path: &Path) -> Result<Vec<RawEventRow>> {
    if path.as_os_str() == "-" {
        return parse_jsonl(io::stdin().lock()).context("failed to read rows from stdin");
    }

    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let rows = if is_csv {
        parse_csv(file)
    } else {
        parse_jsonl(BufReader::new(file))
    }
    .with_context(|| format!("failed to read rows from {}", path.display()))?;

    tracing::debug!(path = %path.display(), rows = rows.len(), "loaded rows");
    Ok(rows)
}

/// Parses JSON Lines. Blank lines are skipped; any other bad line fails the
/// whole load.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Vec<RawEventRow>> {
    let mut rows = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: RawEventRow = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse line {}", line_num + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// One CSV record. Cells are read as text so that a stray value in the
/// numeric column leaves the row for the engine to judge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    display_timestamp: String,
    display_date: String,
    metric_kind: String,
    #[serde(default)]
    numeric_value: Option<String>,
    #[serde(default)]
    raw_payload: Option<String>,
}

impl From<CsvRow> for RawEventRow {
    fn from(row: CsvRow) -> Self {
        let numeric_value = row
            .numeric_value
            .and_then(|cell| cell.trim().parse::<f64>().ok());
        let raw_payload = row
            .raw_payload
            .filter(|cell| !cell.trim().is_empty())
            .map_or(serde_json::Value::Null, serde_json::Value::String);
        Self {
            display_timestamp: row.display_timestamp,
            display_date: row.display_date,
            metric_kind: row.metric_kind,
            numeric_value,
            raw_payload,
        }
    }
}

/// Parses CSV with a header row.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RawEventRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    for (idx, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // Record 1 is the line after the header.
        let record = record.with_context(|| format!("failed to parse record {}", idx + 1))?;
        rows.push(record.into());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slumber_core::EventRow;

    const JSONL: &str = r#"{"displayTimestamp":"2024-01-15 06:00:00","displayDate":"2024-01-15","metricKind":"sleep_session","rawPayload":{"start":"2024-01-14T22:00:00Z","end":"2024-01-15T06:00:00Z","totalSleep":7.5}}

{"displayTimestamp":"2024-01-14 22:05:00","displayDate":"2024-01-14","metricKind":"heart_rate","numericValue":52}
"#;

    const CSV: &str = "displayTimestamp,displayDate,metricKind,numericValue,rawPayload
2024-01-15 06:00:00,2024-01-15,sleep_session,,\"{\"\"start\"\":\"\"2024-01-14T22:00:00Z\"\",\"\"end\"\":\"\"2024-01-15T06:00:00Z\"\",\"\"totalSleep\"\":7.5}\"
2024-01-14 22:05:00,2024-01-14,heart_rate,52,
";

    #[test]
    fn test_parse_jsonl_skips_blank_lines() {
        let rows = parse_jsonl(JSONL.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric_kind(), "sleep_session");
        assert_eq!(rows[1].numeric_value(), Some(52.0));
    }

    #[test]
    fn test_parse_jsonl_reports_line_number() {
        let input = "{\"displayTimestamp\":\"x\",\"displayDate\":\"y\",\"metricKind\":\"z\"}\nnot json\n";
        let err = parse_jsonl(input.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "failed to parse line 2");
    }

    #[test]
    fn test_parse_csv_keeps_payload_as_text() {
        let rows = parse_csv(CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].raw_payload().is_string());
        assert_eq!(rows[0].numeric_value(), None);
        assert_eq!(rows[1].numeric_value(), Some(52.0));
        assert!(rows[1].raw_payload().is_null());
    }

    #[test]
    fn test_csv_and_jsonl_reconcile_identically() {
        use slumber_core::{Engine, EngineConfig, SingleDay};

        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let engine = Engine::new(EngineConfig::default());
        let from_jsonl = parse_jsonl(JSONL.as_bytes()).unwrap();
        let from_csv = parse_csv(CSV.as_bytes()).unwrap();

        let a = engine.reconcile(&from_jsonl, &SingleDay(day)).totals();
        let b = engine.reconcile(&from_csv, &SingleDay(day)).totals();
        assert_eq!(a, b);
        // Six of the eight hours fall on the storage date.
        assert_eq!(a[&day].total_min, 338);
    }

    #[test]
    fn test_load_rows_by_extension() {
        let temp = tempfile::tempdir().unwrap();
        let csv_path = temp.path().join("rows.csv");
        let jsonl_path = temp.path().join("rows.jsonl");
        std::fs::write(&csv_path, CSV).unwrap();
        std::fs::write(&jsonl_path, JSONL).unwrap();

        assert_eq!(load_rows(&csv_path).unwrap().len(), 2);
        assert_eq!(load_rows(&jsonl_path).unwrap().len(), 2);
        let missing = load_rows(&temp.path().join("missing.jsonl")).unwrap_err();
        assert!(missing.to_string().starts_with("failed to open"));
    }
}
