//! Date scopes: which calendar dates a query covers, and how raw date
//! strings map onto them.

use chrono::NaiveDate;

use crate::types::ValidationError;

/// Caller-supplied date membership and normalization.
///
/// The same engine serves a single fixed date and an arbitrary range by
/// swapping the scope.
pub trait DateScope {
    /// Whether output should be produced for this date.
    fn contains(&self, date: NaiveDate) -> bool;

    /// Maps a raw display date onto a canonical calendar date.
    fn normalize(&self, raw: &str) -> Option<NaiveDate> {
        normalize_date(raw)
    }
}

/// A scope covering exactly one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleDay(pub NaiveDate);

impl DateScope for SingleDay {
    fn contains(&self, date: NaiveDate) -> bool {
        date == self.0
    }
}

/// An inclusive range of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range; `start` must not be after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Iterates every date in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(|day| *day <= self.end)
    }
}

impl DateScope for DateRange {
    fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Normalizes a spreadsheet date cell to a calendar date.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a time), `YYYY/MM/DD` and
/// `MM/DD/YYYY`.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(trimmed);

    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(head, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn normalize_accepts_spreadsheet_formats() {
        let expected = Some(date(2024, 1, 15));
        assert_eq!(normalize_date("2024-01-15"), expected);
        assert_eq!(normalize_date(" 2024-01-15 "), expected);
        assert_eq!(normalize_date("2024-01-15 07:30:00 +0100"), expected);
        assert_eq!(normalize_date("2024-01-15T07:30:00Z"), expected);
        assert_eq!(normalize_date("2024/01/15"), expected);
        assert_eq!(normalize_date("01/15/2024"), expected);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("yesterday"), None);
        assert_eq!(normalize_date("2024-13-01"), None);
    }

    #[test]
    fn single_day_contains_only_itself() {
        let scope = SingleDay(date(2024, 1, 15));
        assert!(scope.contains(date(2024, 1, 15)));
        assert!(!scope.contains(date(2024, 1, 16)));
    }

    #[test]
    fn date_range_is_inclusive() {
        let range = DateRange::new(date(2024, 1, 14), date(2024, 1, 16)).unwrap();
        assert!(range.contains(date(2024, 1, 14)));
        assert!(range.contains(date(2024, 1, 16)));
        assert!(!range.contains(date(2024, 1, 17)));
        assert_eq!(range.days().count(), 3);
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let err = DateRange::new(date(2024, 1, 16), date(2024, 1, 14)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "date range ends before it starts: 2024-01-16 > 2024-01-14"
        );
    }
}
