//! Day aggregation.
//!
//! Clips reconciled sleep to calendar-day boundaries and sums per-stage
//! minutes into one [`DayTotals`] per date.
//!
//! # Spillover
//!
//! A unit filed under date `D+1` whose range reaches back into `D` is shown in
//! `D`'s timeline but contributes nothing to `D`'s totals. Each day's totals
//! are computed independently, so `D+1` still counts its own clipped portion.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::record::{SleepSessionRecord, SleepStageInterval};
use crate::scope::DateScope;
use crate::types::{DayClock, StageKind};

/// Where a canonical unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepOrigin {
    /// A canonical aggregate session picked by cluster resolution.
    Session,
    /// A run of contiguous granular stage intervals.
    Stages,
}

impl SleepOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Stages => "stages",
        }
    }
}

/// How a piece's minutes are tallied.
#[derive(Debug, Clone, PartialEq)]
pub enum Tally {
    /// Session-level minutes, apportioned by the clipped fraction of the span.
    Apportioned {
        total: f64,
        deep: f64,
        rem: f64,
        core: f64,
        awake: f64,
    },
    /// Clipped minutes all go to one stage bucket.
    Stage(StageKind),
}

impl Tally {
    /// Whether the piece shows as asleep in the minute timeline.
    pub const fn marks_asleep(&self) -> bool {
        match self {
            Self::Apportioned { .. } => true,
            Self::Stage(stage) => stage.is_asleep(),
        }
    }
}

/// A tallied sub-range of a canonical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepPiece {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tally: Tally,
}

/// One reconciled unit of sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSleep {
    /// Storage key of the originating row(s).
    pub storage_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Asleep plus awake minutes across the whole unit.
    pub full_duration_min: f64,
    pub origin: SleepOrigin,
    pub pieces: Vec<SleepPiece>,
}

impl CanonicalSleep {
    /// Wraps a canonical session.
    pub fn from_session(session: &SleepSessionRecord) -> Self {
        Self {
            storage_date: session.storage_date,
            start: session.start,
            end: session.end,
            full_duration_min: session.full_duration_min(),
            origin: SleepOrigin::Session,
            pieces: vec![SleepPiece {
                start: session.start,
                end: session.end,
                tally: Tally::Apportioned {
                    total: session.total_asleep_min,
                    deep: session.deep_min,
                    rem: session.rem_min,
                    core: session.core_min,
                    awake: session.awake_min,
                },
            }],
        }
    }

    /// Whether this unit is spillover from the next day's storage key, as
    /// seen from `day`.
    pub fn is_spillover_for(&self, day: NaiveDate) -> bool {
        day.succ_opt() == Some(self.storage_date)
    }

    /// Whether any part of the unit falls within `[start, end)`.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Groups granular intervals into episodes: per storage date, maximal runs
/// of intervals that overlap or touch. In-bed intervals carry no sleep
/// information and are skipped.
pub fn stage_episodes(stages: &[SleepStageInterval]) -> Vec<CanonicalSleep> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&SleepStageInterval>> = BTreeMap::new();
    for interval in stages.iter().filter(|i| i.stage != StageKind::InBed) {
        by_date.entry(interval.storage_date).or_default().push(interval);
    }

    let mut episodes: Vec<CanonicalSleep> = Vec::new();
    for (storage_date, mut intervals) in by_date {
        intervals.sort_by_key(|i| (i.start, i.end));

        let mut current: Option<CanonicalSleep> = None;
        for interval in intervals {
            let piece = SleepPiece {
                start: interval.start,
                end: interval.end,
                tally: Tally::Stage(interval.stage),
            };
            match current.as_mut() {
                Some(episode) if interval.start <= episode.end => {
                    episode.end = episode.end.max(interval.end);
                    episode.full_duration_min += minutes_between(interval.start, interval.end);
                    episode.pieces.push(piece);
                }
                _ => {
                    if let Some(done) = current.take() {
                        episodes.push(done);
                    }
                    current = Some(CanonicalSleep {
                        storage_date,
                        start: interval.start,
                        end: interval.end,
                        full_duration_min: minutes_between(interval.start, interval.end),
                        origin: SleepOrigin::Stages,
                        pieces: vec![piece],
                    });
                }
            }
        }
        episodes.extend(current);
    }

    episodes.sort_by_key(|e| (e.start, e.end));
    episodes
}

/// Minute totals for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTotals {
    pub date: NaiveDate,
    pub total_min: u32,
    pub deep_min: u32,
    pub rem_min: u32,
    pub core_min: u32,
    pub awake_min: u32,
}

impl DayTotals {
    /// Totals for a date with no counted sleep.
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_min: 0,
            deep_min: 0,
            rem_min: 0,
            core_min: 0,
            awake_min: 0,
        }
    }
}

/// Fractional minute buckets, rounded once per day.
#[derive(Debug, Default)]
struct Buckets {
    total: f64,
    deep: f64,
    rem: f64,
    core: f64,
    awake: f64,
}

impl Buckets {
    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, piece: &SleepPiece, clipped_secs: i64) {
        match &piece.tally {
            Tally::Apportioned {
                total,
                deep,
                rem,
                core,
                awake,
            } => {
                let span_secs = (piece.end - piece.start).num_seconds();
                if span_secs <= 0 {
                    return;
                }
                let fraction = clipped_secs as f64 / span_secs as f64;
                self.total += total * fraction;
                self.deep += deep * fraction;
                self.rem += rem * fraction;
                self.core += core * fraction;
                self.awake += awake * fraction;
            }
            Tally::Stage(stage) => {
                let minutes = clipped_secs as f64 / 60.0;
                match stage {
                    StageKind::Deep => {
                        self.deep += minutes;
                        self.total += minutes;
                    }
                    StageKind::Rem => {
                        self.rem += minutes;
                        self.total += minutes;
                    }
                    StageKind::Core => {
                        self.core += minutes;
                        self.total += minutes;
                    }
                    StageKind::Asleep => self.total += minutes,
                    StageKind::Awake => self.awake += minutes,
                    StageKind::InBed => {}
                }
            }
        }
    }

    fn finish(&self, date: NaiveDate) -> DayTotals {
        DayTotals {
            date,
            total_min: round_minutes(self.total),
            deep_min: round_minutes(self.deep),
            rem_min: round_minutes(self.rem),
            core_min: round_minutes(self.core),
            awake_min: round_minutes(self.awake),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_minutes(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[allow(clippy::cast_precision_loss)]
fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

/// Seconds of `[start, end)` falling within `[lo, hi)`.
pub(crate) fn overlap_secs(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
) -> i64 {
    let clipped_start = start.max(lo);
    let clipped_end = end.min(hi);
    if clipped_end > clipped_start {
        (clipped_end - clipped_start).num_seconds()
    } else {
        0
    }
}

/// Totals for one date, or `None` when nothing is counted there.
pub fn day_totals(day: NaiveDate, units: &[CanonicalSleep], clock: &DayClock) -> Option<DayTotals> {
    let (day_start, day_end) = clock.day_bounds(day)?;
    let mut buckets = Buckets::default();
    let mut counted = false;

    for unit in units {
        if !unit.intersects(day_start, day_end) || unit.is_spillover_for(day) {
            continue;
        }
        for piece in &unit.pieces {
            let clipped = overlap_secs(piece.start, piece.end, day_start, day_end);
            if clipped > 0 {
                counted = true;
                buckets.add(piece, clipped);
            }
        }
    }

    counted.then(|| buckets.finish(day))
}

/// Every date any unit touches.
fn touched_dates(units: &[CanonicalSleep], clock: &DayClock) -> BTreeSet<NaiveDate> {
    let mut dates = BTreeSet::new();
    for unit in units {
        let first = clock.date_of(unit.start);
        let last = clock.date_of(unit.end - Duration::seconds(1));
        dates.extend(first.iter_days().take_while(|day| *day <= last));
    }
    dates
}

/// Per-date totals for every in-scope date with counted sleep.
///
/// Dates are computed independently and in parallel.
pub fn aggregate<S>(
    scope: &S,
    units: &[CanonicalSleep],
    clock: &DayClock,
) -> BTreeMap<NaiveDate, DayTotals>
where
    S: DateScope + Sync + ?Sized,
{
    let dates: Vec<NaiveDate> = touched_dates(units, clock)
        .into_iter()
        .filter(|day| scope.contains(*day))
        .collect();

    dates
        .par_iter()
        .filter_map(|day| day_totals(*day, units, clock).map(|totals| (*day, totals)))
        .collect()
}
