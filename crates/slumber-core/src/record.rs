//! Typed records parsed from raw event rows.
//!
//! Malformed rows never surface as errors to the caller: each parse failure
//! is classified as a [`RecordError`], logged, counted and dropped.

use std::borrow::Cow;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::row::EventRow;
use crate::scope::DateScope;
use crate::types::{DayClock, MetricKind, StageKind};

/// Reasons a row is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),
    #[error("payload is not a JSON object")]
    InvalidPayload,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid display date: {0}")]
    InvalidDate(String),
    #[error("range does not end after it starts")]
    InvertedRange,
    #[error("unknown sleep stage: {0}")]
    UnknownStage(String),
}

/// An aggregate sleep session as reported by the wearable.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepSessionRecord {
    /// The storage key (display date) the row was filed under.
    pub storage_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_asleep_min: f64,
    pub deep_min: f64,
    pub rem_min: f64,
    pub core_min: f64,
    pub awake_min: f64,
}

impl SleepSessionRecord {
    /// Asleep plus awake minutes.
    pub fn full_duration_min(&self) -> f64 {
        self.total_asleep_min + self.awake_min
    }

    /// Wall-clock length of the session range, in seconds.
    pub fn span_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// A granular sleep-stage interval.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepStageInterval {
    pub storage_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stage: StageKind,
    pub duration_min: f64,
}

/// A timestamped heart-rate or step reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub instant: DateTime<Utc>,
    pub value: f64,
}

pub type HeartRateSample = Sample;
pub type StepSample = Sample;

/// Everything parsed from one row snapshot.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    pub sessions: Vec<SleepSessionRecord>,
    /// Deduplicated by `(start, end, stage)` and sorted by start.
    pub stages: Vec<SleepStageInterval>,
    /// Sorted by instant.
    pub heart_rate: Vec<HeartRateSample>,
    /// Sorted by instant.
    pub steps: Vec<StepSample>,
    /// Rows rejected as malformed.
    pub dropped: usize,
    /// Stage rows collapsed as duplicates.
    pub duplicates: usize,
}

enum Parsed {
    Session(SleepSessionRecord),
    Stage(SleepStageInterval),
    HeartRate(Sample),
    Step(Sample),
}

/// Parses a row snapshot into typed records.
///
/// Rows are parsed in parallel; output order only depends on input order.
pub fn parse_rows<R, S>(rows: &[R], scope: &S, clock: &DayClock) -> ParsedRecords
where
    R: EventRow + Sync,
    S: DateScope + Sync + ?Sized,
{
    let results: Vec<Result<Parsed, RecordError>> = rows
        .par_iter()
        .map(|row| parse_row(row, scope, clock))
        .collect();

    let mut parsed = ParsedRecords::default();
    let mut seen_stages: HashSet<(DateTime<Utc>, DateTime<Utc>, StageKind)> = HashSet::new();

    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(Parsed::Session(session)) => parsed.sessions.push(session),
            Ok(Parsed::Stage(interval)) => {
                if seen_stages.insert((interval.start, interval.end, interval.stage)) {
                    parsed.stages.push(interval);
                } else {
                    parsed.duplicates += 1;
                }
            }
            Ok(Parsed::HeartRate(sample)) => parsed.heart_rate.push(sample),
            Ok(Parsed::Step(sample)) => parsed.steps.push(sample),
            Err(err) => {
                tracing::debug!(row = idx, error = %err, "dropping malformed row");
                parsed.dropped += 1;
            }
        }
    }

    parsed.stages.sort_by_key(|interval| (interval.start, interval.end));
    parsed.heart_rate.sort_by_key(|sample| sample.instant);
    parsed.steps.sort_by_key(|sample| sample.instant);

    tracing::debug!(
        sessions = parsed.sessions.len(),
        stages = parsed.stages.len(),
        heart_rate = parsed.heart_rate.len(),
        steps = parsed.steps.len(),
        dropped = parsed.dropped,
        duplicates = parsed.duplicates,
        "parsed row snapshot"
    );

    parsed
}

fn parse_row<R, S>(row: &R, scope: &S, clock: &DayClock) -> Result<Parsed, RecordError>
where
    R: EventRow,
    S: DateScope + ?Sized,
{
    let kind: MetricKind = row
        .metric_kind()
        .parse()
        .map_err(|_| RecordError::UnknownKind(row.metric_kind().to_string()))?;

    match kind {
        MetricKind::SleepSession => {
            let storage_date = storage_date(row, scope)?;
            parse_session(row.raw_payload(), storage_date, clock).map(Parsed::Session)
        }
        MetricKind::SleepStage => {
            let storage_date = storage_date(row, scope)?;
            parse_stage(row.raw_payload(), storage_date, clock).map(Parsed::Stage)
        }
        MetricKind::HeartRate => parse_sample(row, clock).map(Parsed::HeartRate),
        MetricKind::StepCount => parse_sample(row, clock).map(Parsed::Step),
    }
}

fn storage_date<R, S>(row: &R, scope: &S) -> Result<NaiveDate, RecordError>
where
    R: EventRow,
    S: DateScope + ?Sized,
{
    scope
        .normalize(row.display_date())
        .ok_or_else(|| RecordError::InvalidDate(row.display_date().to_string()))
}

/// Session payload; per-stage values are hours.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(alias = "sleepStart", alias = "startDate")]
    start: Option<String>,
    #[serde(alias = "sleepEnd", alias = "endDate")]
    end: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    total_sleep: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    asleep: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    deep: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    rem: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    core: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    awake: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagePayload {
    #[serde(alias = "startDate")]
    start: Option<String>,
    #[serde(alias = "endDate")]
    end: Option<String>,
    #[serde(alias = "value")]
    stage: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    duration_min: Option<f64>,
    /// Duration in hours, as some exports report it.
    #[serde(default, deserialize_with = "lenient_number")]
    qty: Option<f64>,
}

fn parse_session(
    payload: &Value,
    storage_date: NaiveDate,
    clock: &DayClock,
) -> Result<SleepSessionRecord, RecordError> {
    let payload: SessionPayload = decode_payload(payload)?;
    let start = payload.start.ok_or(RecordError::MissingField("start"))?;
    let end = payload.end.ok_or(RecordError::MissingField("end"))?;
    let start = parse_instant(&start, clock)?;
    let end = parse_instant(&end, clock)?;
    if start >= end {
        return Err(RecordError::InvertedRange);
    }

    let minutes = |hours: Option<f64>| hours.map_or(0.0, |h| (h * 60.0).max(0.0));
    Ok(SleepSessionRecord {
        storage_date,
        start,
        end,
        total_asleep_min: minutes(payload.total_sleep.or(payload.asleep).or(payload.total)),
        deep_min: minutes(payload.deep),
        rem_min: minutes(payload.rem),
        core_min: minutes(payload.core),
        awake_min: minutes(payload.awake),
    })
}

fn parse_stage(
    payload: &Value,
    storage_date: NaiveDate,
    clock: &DayClock,
) -> Result<SleepStageInterval, RecordError> {
    let payload: StagePayload = decode_payload(payload)?;
    let start = payload.start.ok_or(RecordError::MissingField("start"))?;
    let end = payload.end.ok_or(RecordError::MissingField("end"))?;
    let stage = payload.stage.ok_or(RecordError::MissingField("stage"))?;
    let start = parse_instant(&start, clock)?;
    let end = parse_instant(&end, clock)?;
    if start >= end {
        return Err(RecordError::InvertedRange);
    }
    let stage: StageKind = stage
        .parse()
        .map_err(|_| RecordError::UnknownStage(stage.clone()))?;

    #[allow(clippy::cast_precision_loss)]
    let span_min = (end - start).num_seconds() as f64 / 60.0;
    let duration_min = payload
        .duration_min
        .or_else(|| payload.qty.map(|hours| hours * 60.0))
        .unwrap_or(span_min);

    Ok(SleepStageInterval {
        storage_date,
        start,
        end,
        stage,
        duration_min,
    })
}

/// Heart-rate and step rows: value from the cell, falling back to the
/// payload; instant from the payload `date`, falling back to the row.
fn parse_sample<R: EventRow>(row: &R, clock: &DayClock) -> Result<Sample, RecordError> {
    let payload = payload_object(row.raw_payload()).ok();
    let field = |name: &str| payload.as_deref().and_then(|p| p.get(name));

    let value = row
        .numeric_value()
        .or_else(|| {
            ["qty", "Avg", "avg", "value"]
                .into_iter()
                .find_map(|name| field(name).and_then(number_of))
        })
        .filter(|value| value.is_finite())
        .ok_or(RecordError::MissingField("value"))?;

    let instant = match field("date").and_then(Value::as_str) {
        Some(date) => parse_instant(date, clock)?,
        None => parse_instant(row.display_timestamp(), clock)?,
    };

    Ok(Sample { instant, value })
}

fn decode_payload<T: for<'de> Deserialize<'de>>(payload: &Value) -> Result<T, RecordError> {
    let object = payload_object(payload)?;
    T::deserialize(object.as_ref()).map_err(|_| RecordError::InvalidPayload)
}

/// Payloads arrive either as JSON objects or as JSON text in a cell.
fn payload_object(payload: &Value) -> Result<Cow<'_, Value>, RecordError> {
    match payload {
        Value::Object(_) => Ok(Cow::Borrowed(payload)),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => Ok(Cow::Owned(value)),
            _ => Err(RecordError::InvalidPayload),
        },
        _ => Err(RecordError::InvalidPayload),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts numbers or numeric strings; anything else reads as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_of)
        .filter(|n| n.is_finite()))
}

/// Parses a timestamp in any of the formats health exports emit.
///
/// Timestamps without an offset are read in the clock's offset.
pub fn parse_instant(raw: &str, clock: &DayClock) -> Result<DateTime<Utc>, RecordError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .and_then(|naive| clock.localize(naive))
        .ok_or_else(|| RecordError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RawEventRow;
    use crate::scope::SingleDay;
    use serde_json::json;

    fn row(kind: &str, date: &str, value: Option<f64>, payload: Value) -> RawEventRow {
        RawEventRow {
            display_timestamp: format!("{date} 08:00:00"),
            display_date: date.to_string(),
            metric_kind: kind.to_string(),
            numeric_value: value,
            raw_payload: payload,
        }
    }

    fn parse(rows: &[RawEventRow]) -> ParsedRecords {
        let scope = SingleDay(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        parse_rows(rows, &scope, &DayClock::utc())
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn session_hours_become_minutes() {
        let rows = [row(
            "sleep_session",
            "2024-01-15",
            None,
            json!({
                "sleepStart": "2024-01-14 23:00:00 +0000",
                "sleepEnd": "2024-01-15 07:00:00 +0000",
                "totalSleep": 7.5,
                "deep": 1.0,
                "rem": "1.5",
                "core": 5.0,
                "awake": 0.5
            }),
        )];
        let parsed = parse(&rows);

        assert_eq!(parsed.sessions.len(), 1);
        let session = &parsed.sessions[0];
        assert_eq!(session.start, utc("2024-01-14T23:00:00Z"));
        assert_eq!(session.end, utc("2024-01-15T07:00:00Z"));
        assert!((session.total_asleep_min - 450.0).abs() < f64::EPSILON);
        assert!((session.rem_min - 90.0).abs() < f64::EPSILON);
        assert!((session.full_duration_min() - 480.0).abs() < f64::EPSILON);
        assert_eq!(session.storage_date.to_string(), "2024-01-15");
    }

    #[test]
    fn plain_total_key_is_read_as_asleep_minutes() {
        let rows = [row(
            "sleep_session",
            "2024-01-15",
            None,
            json!({
                "start": "2024-01-14T23:00:00Z",
                "end": "2024-01-15T07:00:00Z",
                "total": 7.0
            }),
        )];
        let parsed = parse(&rows);

        assert_eq!(parsed.dropped, 0);
        assert!((parsed.sessions[0].total_asleep_min - 420.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_sleep_takes_precedence_over_total() {
        let rows = [row(
            "sleep_session",
            "2024-01-15",
            None,
            json!({
                "start": "2024-01-14T23:00:00Z",
                "end": "2024-01-15T07:00:00Z",
                "totalSleep": 6.0,
                "total": 8.0
            }),
        )];

        assert!((parse(&rows).sessions[0].total_asleep_min - 360.0).abs() < f64::EPSILON);
    }

    #[test]
    fn timestamps_past_the_representable_range_drop_the_row() {
        let rows = [row(
            "sleep_session",
            "2024-01-15",
            None,
            json!({
                "start": "+262143-12-31 22:00:00",
                "end": "+262143-12-31 23:00:00"
            }),
        )];
        let scope = SingleDay(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        let clock = DayClock::from_offset_minutes(-300).unwrap();
        let parsed = parse_rows(&rows, &scope, &clock);

        assert!(parsed.sessions.is_empty());
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn session_payload_stored_as_text_is_accepted() {
        let payload = r#"{"start":"2024-01-14T23:00:00Z","end":"2024-01-15T06:00:00Z","asleep":6}"#;
        let rows = [row("sleep_session", "2024-01-15", None, json!(payload))];
        let parsed = parse(&rows);

        assert_eq!(parsed.sessions.len(), 1);
        assert!((parsed.sessions[0].total_asleep_min - 360.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_rows_are_dropped_silently() {
        let rows = [
            // missing end
            row(
                "sleep_session",
                "2024-01-15",
                None,
                json!({"start": "2024-01-14T23:00:00Z"}),
            ),
            // unparsable payload
            row("sleep_session", "2024-01-15", None, json!("{not json")),
            // inverted range
            row(
                "sleep_session",
                "2024-01-15",
                None,
                json!({"start": "2024-01-15T07:00:00Z", "end": "2024-01-15T06:00:00Z"}),
            ),
            // bad storage date
            row(
                "sleep_session",
                "someday",
                None,
                json!({"start": "2024-01-14T23:00:00Z", "end": "2024-01-15T06:00:00Z"}),
            ),
            // unknown kind
            row("blood_oxygen", "2024-01-15", Some(97.0), Value::Null),
            // heart rate without a value
            row("heart_rate", "2024-01-15", None, Value::Null),
        ];
        let parsed = parse(&rows);

        assert!(parsed.sessions.is_empty());
        assert!(parsed.heart_rate.is_empty());
        assert_eq!(parsed.dropped, 6);
    }

    #[test]
    fn duplicate_stage_intervals_collapse() {
        let stage = json!({
            "startDate": "2024-01-15T01:00:00Z",
            "endDate": "2024-01-15T02:00:00Z",
            "value": "Deep"
        });
        let rows = [
            row("sleep_stage", "2024-01-15", None, stage.clone()),
            row("sleep_stage", "2024-01-15", None, stage),
            row(
                "sleep_stage",
                "2024-01-15",
                None,
                json!({
                    "startDate": "2024-01-15T01:00:00Z",
                    "endDate": "2024-01-15T02:00:00Z",
                    "value": "REM"
                }),
            ),
        ];
        let parsed = parse(&rows);

        assert_eq!(parsed.stages.len(), 2);
        assert_eq!(parsed.duplicates, 1);
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn stage_duration_falls_back_to_span() {
        let rows = [
            row(
                "sleep_stage",
                "2024-01-15",
                None,
                json!({"start": "2024-01-15T01:00:00Z", "end": "2024-01-15T01:45:00Z", "stage": "core"}),
            ),
            row(
                "sleep_stage",
                "2024-01-15",
                None,
                json!({"start": "2024-01-15T02:00:00Z", "end": "2024-01-15T02:30:00Z", "stage": "awake", "qty": 0.25}),
            ),
        ];
        let parsed = parse(&rows);

        assert!((parsed.stages[0].duration_min - 45.0).abs() < f64::EPSILON);
        assert!((parsed.stages[1].duration_min - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn samples_use_cell_value_then_payload() {
        let rows = [
            row("heart_rate", "2024-01-15", Some(61.0), Value::Null),
            row(
                "heart_rate",
                "2024-01-15",
                None,
                json!({"Avg": 72, "date": "2024-01-15 03:00:00"}),
            ),
            row("step_count", "2024-01-15", None, json!({"qty": "14"})),
        ];
        let parsed = parse(&rows);

        assert_eq!(parsed.heart_rate.len(), 2);
        assert_eq!(parsed.heart_rate[0].instant, utc("2024-01-15T03:00:00Z"));
        assert!((parsed.heart_rate[0].value - 72.0).abs() < f64::EPSILON);
        assert_eq!(parsed.heart_rate[1].instant, utc("2024-01-15T08:00:00Z"));
        assert!((parsed.steps[0].value - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn naive_timestamps_use_clock_offset() {
        let clock = DayClock::from_offset_minutes(-300).unwrap();
        let instant = parse_instant("2024-01-15 22:00:00", &clock).unwrap();
        assert_eq!(instant, utc("2024-01-16T03:00:00Z"));

        let explicit = parse_instant("2024-01-15 22:00:00 +0100", &clock).unwrap();
        assert_eq!(explicit, utc("2024-01-15T21:00:00Z"));

        assert!(parse_instant("last tuesday", &clock).is_err());
    }
}
