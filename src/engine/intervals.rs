//! Business-hour intervals inside a lookback window.

use super::schedule::{DaySchedule, WeeklySchedule};
use super::timezone::{local_to_utc, to_local};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;

/// Half-open UTC range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UtcInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `lookback` ending at `now`, if representable.
    pub fn ending_at(now: DateTime<Utc>, lookback: TimeDelta) -> Option<Self> {
        let start = now.checked_sub_signed(lookback)?;
        Some(Self { start, end: now })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn intersect(&self, other: &UtcInterval) -> Option<UtcInterval> {
        let clipped = UtcInterval {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        };
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Scheduled-open time of one store inside `window`, as ordered,
/// non-overlapping UTC intervals.
pub fn business_intervals(window: UtcInterval, schedule: &WeeklySchedule, tz: Tz) -> Vec<UtcInterval> {
    if window.is_empty() {
        return Vec::new();
    }
    if schedule.is_always_open() {
        return vec![window];
    }

    // Start a day early so yesterday's overnight tail is seen.
    let first = to_local(window.start, tz).date();
    let first = first.pred_opt().unwrap_or(first);
    let last = to_local(window.end, tz).date();

    let mut intervals = Vec::new();
    let mut date = first;
    while date <= last {
        for (local_start, local_end) in local_spans(date, schedule.day(date.weekday())) {
            let interval = UtcInterval::new(local_to_utc(local_start, tz), local_to_utc(local_end, tz));
            if let Some(clipped) = interval.intersect(&window) {
                intervals.push(clipped);
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    coalesce(intervals)
}

fn local_spans(date: NaiveDate, day: &DaySchedule) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let midnight = date.and_time(NaiveTime::MIN);
    let Some(next_midnight) = date.succ_opt().map(|next| next.and_time(NaiveTime::MIN)) else {
        return Vec::new();
    };

    match day {
        DaySchedule::AllDay => vec![(midnight, next_midnight)],
        DaySchedule::Open(spans) => {
            let mut out = Vec::with_capacity(spans.len() + 1);
            for span in spans {
                if span.is_overnight() {
                    out.push((date.and_time(span.open), next_midnight));
                    out.push((next_midnight, next_midnight.date().and_time(span.close)));
                } else {
                    out.push((date.and_time(span.open), date.and_time(span.close)));
                }
            }
            out
        }
    }
}

// Overnight tails may run into the next day's first span, and full days
// touch each other; both collapse into single intervals.
fn coalesce(mut intervals: Vec<UtcInterval>) -> Vec<UtcInterval> {
    intervals.sort_by_key(|interval| (interval.start, interval.end));
    let mut merged: Vec<UtcInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start <= current.end => {
                current.end = current.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}
