//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of minute slots in one calendar day.
pub const MINUTES_PER_DAY: usize = 1440;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The UTC offset string could not be parsed.
    #[error("invalid UTC offset: {value}")]
    InvalidOffset { value: String },

    /// The UTC offset is outside +/-24 hours.
    #[error("UTC offset out of range: {minutes} minutes")]
    OffsetOutOfRange { minutes: i32 },

    /// A date range ends before it starts.
    #[error("date range ends before it starts: {start} > {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

/// Metric kinds carried by raw event rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    HeartRate,
    StepCount,
    SleepSession,
    SleepStage,
}

impl MetricKind {
    /// Canonical string form, as written by the ingestion layer.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HeartRate => "heart_rate",
            Self::StepCount => "step_count",
            Self::SleepSession => "sleep_session",
            Self::SleepStage => "sleep_stage",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = UnknownMetricKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "heart_rate" => Ok(Self::HeartRate),
            "step_count" | "steps" => Ok(Self::StepCount),
            "sleep_session" | "sleep_analysis" => Ok(Self::SleepSession),
            "sleep_stage" => Ok(Self::SleepStage),
            other => Err(UnknownMetricKind(other.to_string())),
        }
    }
}

/// Error type for unknown metric kind strings.
#[derive(Debug, Clone, Error)]
#[error("unknown metric kind: {0}")]
pub struct UnknownMetricKind(String);

/// Granular sleep stage reported by the wearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Core,
    Deep,
    Rem,
    Awake,
    InBed,
    /// Asleep without a stage breakdown (older devices).
    Asleep,
}

impl StageKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Deep => "deep",
            Self::Rem => "rem",
            Self::Awake => "awake",
            Self::InBed => "in_bed",
            Self::Asleep => "asleep",
        }
    }

    /// Whether minutes in this stage count as sleep.
    #[must_use]
    pub const fn is_asleep(&self) -> bool {
        !matches!(self, Self::Awake | Self::InBed)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = UnknownStageKind;

    /// Accepts the snake-case names plus the spellings health exports use
    /// (`"In Bed"`, `"REM"`, `"HKCategoryValueSleepAnalysisAsleepDeep"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix("HKCategoryValueSleepAnalysis")
            .unwrap_or(trimmed);
        let key: String = stripped
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "core" | "asleepcore" | "light" => Ok(Self::Core),
            "deep" | "asleepdeep" => Ok(Self::Deep),
            "rem" | "asleeprem" => Ok(Self::Rem),
            "awake" => Ok(Self::Awake),
            "inbed" => Ok(Self::InBed),
            "asleep" | "asleepunspecified" | "unspecified" => Ok(Self::Asleep),
            _ => Err(UnknownStageKind(trimmed.to_string())),
        }
    }
}

/// Error type for unknown sleep stage strings.
#[derive(Debug, Clone, Error)]
#[error("unknown sleep stage: {0}")]
pub struct UnknownStageKind(String);

/// Calendar-day boundaries in a fixed UTC offset.
///
/// Day `D` spans `[D 00:00, D+1 00:00)` in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayClock {
    offset: FixedOffset,
}

impl DayClock {
    /// Clock with day boundaries at UTC midnight.
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Creates a clock from an offset east of UTC, in minutes.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ValidationError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or(ValidationError::OffsetOutOfRange { minutes })
    }

    /// Offset east of UTC, in minutes.
    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Start of the given local date, as a UTC instant.
    pub fn day_start(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.localize(date.and_time(NaiveTime::MIN))
    }

    /// Half-open `[start, end)` bounds of the given local date. `None` when
    /// either bound falls outside the representable range.
    pub fn day_bounds(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.day_start(date)?;
        let end = start.checked_add_signed(Duration::days(1))?;
        Some((start, end))
    }

    /// Local calendar date an instant falls on.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Interprets a wall-clock datetime in this clock's offset.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        naive
            .checked_sub_signed(Duration::seconds(i64::from(self.offset.local_minus_utc())))
            .map(|utc| utc.and_utc())
    }

    /// Formats an instant as local `HH:MM`.
    pub fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%H:%M").to_string()
    }

    /// Formats an instant as local `YYYY-MM-DD HH:MM`.
    pub fn format_datetime(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

impl Default for DayClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for DayClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.offset_minutes();
        let sign = if minutes < 0 { '-' } else { '+' };
        let abs = minutes.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)
    }
}

impl FromStr for DayClock {
    type Err = ValidationError;

    /// Parses `Z`, `UTC`, `+HH:MM`, `-HH:MM`, `+HHMM` or `+HH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidOffset {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| invalid())?,
                digits[2..].parse::<i32>().map_err(|_| invalid())?,
            ),
            _ => return Err(invalid()),
        };
        if minutes >= 60 {
            return Err(invalid());
        }
        Self::from_offset_minutes(sign * (hours * 60 + minutes))
    }
}
