/// Splits a station's period of record into calendar-year spans.
///
/// The data endpoint rejects ranges longer than one year, so every station
/// is fetched one span at a time.

use chrono::{Datelike, NaiveDate};

/// Inclusive date range, never crossing a year boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Year-aligned spans covering `start..=end`, in chronological order.
///
/// The first span starts at `start` and the last ends at `end`; every span
/// in between covers Jan 1 through Dec 31. Returns nothing when
/// `start > end`.
pub fn year_spans(start: NaiveDate, end: NaiveDate) -> Vec<DateSpan> {
    if start > end {
        return Vec::new();
    }

    (start.year()..=end.year())
        .filter_map(|year| {
            let first = NaiveDate::from_ymd_opt(year, 1, 1)?.max(start);
            let last = NaiveDate::from_ymd_opt(year, 12, 31)?.min(end);
            Some(DateSpan { start: first, end: last })
        })
        .collect()
}
