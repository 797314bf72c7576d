//! Fixture helpers shared by unit tests.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::record::{Sample, SleepSessionRecord, SleepStageInterval};
use crate::types::StageKind;

/// A date in January 2024.
pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

/// Hours and minutes past 2024-01-14 00:00 UTC; hours past 24 roll into
/// the following days.
pub fn ts(hours: i64, minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap()
        + Duration::hours(hours)
        + Duration::minutes(minutes)
}

/// A session filed under the UTC date it ends on.
pub fn session(start: DateTime<Utc>, end: DateTime<Utc>, total_asleep_min: f64) -> SleepSessionRecord {
    session_on(end.date_naive(), start, end, total_asleep_min)
}

pub fn session_on(
    storage_date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total_asleep_min: f64,
) -> SleepSessionRecord {
    SleepSessionRecord {
        storage_date,
        start,
        end,
        total_asleep_min,
        deep_min: 0.0,
        rem_min: 0.0,
        core_min: 0.0,
        awake_min: 0.0,
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn stage(
    storage_date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    stage: StageKind,
) -> SleepStageInterval {
    SleepStageInterval {
        storage_date,
        start,
        end,
        stage,
        duration_min: (end - start).num_seconds() as f64 / 60.0,
    }
}

pub const fn sample(instant: DateTime<Utc>, value: f64) -> Sample {
    Sample { instant, value }
}
