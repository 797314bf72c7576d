//! Expanded single-day view: a per-minute tag array plus annotated blocks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::aggregate::{self, CanonicalSleep, DayTotals, SleepOrigin};
use crate::types::{DayClock, MINUTES_PER_DAY};

/// Tag for one minute of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotTag {
    Asleep,
    Blank,
}

/// A contiguous run of asleep minutes from one canonical unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepBlock {
    /// First minute of the day covered (0-based).
    pub start_minute: usize,
    /// Minute after the last one covered.
    pub end_minute: usize,
    pub origin: SleepOrigin,
    /// Full start of the originating unit, before clipping.
    pub origin_start: DateTime<Utc>,
    /// Full end of the originating unit, before clipping.
    pub origin_end: DateTime<Utc>,
    /// Asleep plus awake minutes of the originating unit.
    pub full_duration_min: f64,
    /// Filed under the next day's storage key; shown but not counted.
    pub spillover: bool,
}

impl SleepBlock {
    pub const fn minutes(&self) -> usize {
        self.end_minute - self.start_minute
    }
}

/// The expanded view for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTimeline {
    pub date: NaiveDate,
    /// Always [`MINUTES_PER_DAY`] entries.
    pub slots: Vec<SlotTag>,
    pub blocks: Vec<SleepBlock>,
    /// Same values the batch view reports for this date.
    pub totals: DayTotals,
}

impl DayTimeline {
    /// Number of minutes tagged asleep.
    pub fn asleep_minutes(&self) -> usize {
        self.slots.iter().filter(|tag| **tag == SlotTag::Asleep).count()
    }
}

/// Builds the expanded view of `day`.
pub fn build_timeline(day: NaiveDate, units: &[CanonicalSleep], clock: &DayClock) -> DayTimeline {
    let mut slots = vec![SlotTag::Blank; MINUTES_PER_DAY];
    let mut blocks = Vec::new();
    let Some((day_start, day_end)) = clock.day_bounds(day) else {
        return DayTimeline {
            date: day,
            slots,
            blocks,
            totals: DayTotals::empty(day),
        };
    };

    for unit in units.iter().filter(|u| u.intersects(day_start, day_end)) {
        let mut runs: Vec<(usize, usize)> = unit
            .pieces
            .iter()
            .filter(|piece| piece.tally.marks_asleep())
            .filter_map(|piece| minute_range(piece.start, piece.end, day_start, day_end))
            .collect();
        runs.sort_unstable();

        let spillover = unit.is_spillover_for(day);
        for (start_minute, end_minute) in merge_runs(runs) {
            for slot in &mut slots[start_minute..end_minute] {
                *slot = SlotTag::Asleep;
            }
            blocks.push(SleepBlock {
                start_minute,
                end_minute,
                origin: unit.origin,
                origin_start: unit.start,
                origin_end: unit.end,
                full_duration_min: unit.full_duration_min,
                spillover,
            });
        }
    }

    blocks.sort_by_key(|block| (block.start_minute, block.end_minute));
    let totals = aggregate::day_totals(day, units, clock).unwrap_or_else(|| DayTotals::empty(day));

    DayTimeline {
        date: day,
        slots,
        blocks,
        totals,
    }
}

/// Minute slots touched by `[start, end)` within the day, as `[first, last)`.
fn minute_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> Option<(usize, usize)> {
    if aggregate::overlap_secs(start, end, day_start, day_end) == 0 {
        return None;
    }
    let from_secs = (start.max(day_start) - day_start).num_seconds();
    let to_secs = (end.min(day_end) - day_start).num_seconds();
    let first = usize::try_from(from_secs / 60).ok()?;
    let last = usize::try_from((to_secs + 59) / 60).ok()?;
    Some((first, last.min(MINUTES_PER_DAY)))
}

/// Merges sorted runs that overlap or touch.
fn merge_runs(runs: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in runs {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
