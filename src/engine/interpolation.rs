//! Step interpolation of sparse status polls over a bounding interval.

use super::intervals::UtcInterval;
use crate::model::{Observation, StoreStatus};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::ops::AddAssign;

/// Status assumed for the stretch of an interval that precedes every known
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStatusPolicy {
    /// Extend the first sample inside the interval backwards to its start.
    #[default]
    Backfill,
    Inactive,
    /// Leave the stretch out of both totals.
    Exclude,
}

/// Time split of one interval. The three parts always add up to the interval
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub active: TimeDelta,
    pub inactive: TimeDelta,
    pub unknown: TimeDelta,
}

impl Coverage {
    pub fn total(&self) -> TimeDelta {
        self.active + self.inactive + self.unknown
    }

    fn record(&mut self, status: Option<StoreStatus>, span: TimeDelta) {
        match status {
            Some(StoreStatus::Active) => self.active += span,
            Some(StoreStatus::Inactive) => self.inactive += span,
            None => self.unknown += span,
        }
    }
}

impl Default for Coverage {
    fn default() -> Self {
        Self {
            active: TimeDelta::zero(),
            inactive: TimeDelta::zero(),
            unknown: TimeDelta::zero(),
        }
    }
}

impl AddAssign for Coverage {
    fn add_assign(&mut self, other: Coverage) {
        self.active += other.active;
        self.inactive += other.inactive;
        self.unknown += other.unknown;
    }
}

/// A store's samples ordered by time, one per timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTimeline {
    samples: Vec<(DateTime<Utc>, StoreStatus)>,
}

impl StatusTimeline {
    /// Stable-sorts by timestamp; among samples sharing a timestamp the last
    /// one in input order wins.
    pub fn from_observations<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut sorted: Vec<(DateTime<Utc>, StoreStatus)> = observations
            .into_iter()
            .map(|observation| (observation.timestamp_utc, observation.status))
            .collect();
        sorted.sort_by_key(|(timestamp, _)| *timestamp);

        let mut samples: Vec<(DateTime<Utc>, StoreStatus)> = Vec::with_capacity(sorted.len());
        for sample in sorted {
            match samples.last_mut() {
                Some(last) if last.0 == sample.0 => *last = sample,
                _ => samples.push(sample),
            }
        }
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[(DateTime<Utc>, StoreStatus)] {
        &self.samples
    }
}

/// Partition `interval` into active, inactive and unknown time.
///
/// The latest sample strictly before the interval seeds its left edge; every
/// sample inside it holds until the next one, and the last holds until the
/// interval's end.
pub fn estimate(
    timeline: &StatusTimeline,
    interval: &UtcInterval,
    policy: MissingStatusPolicy,
) -> Coverage {
    let mut coverage = Coverage::default();
    if interval.is_empty() {
        return coverage;
    }

    let samples = timeline.samples();
    let first_inside = samples.partition_point(|(timestamp, _)| *timestamp < interval.start);
    let past_end = samples.partition_point(|(timestamp, _)| *timestamp < interval.end);
    let inside = &samples[first_inside..past_end];

    let seed = match first_inside.checked_sub(1) {
        Some(index) => Some(samples[index].1),
        None => match policy {
            MissingStatusPolicy::Backfill => inside.first().map(|(_, status)| *status),
            MissingStatusPolicy::Inactive => Some(StoreStatus::Inactive),
            MissingStatusPolicy::Exclude => None,
        },
    };

    let mut cursor = interval.start;
    let mut current = seed;
    for (timestamp, status) in inside {
        coverage.record(current, *timestamp - cursor);
        cursor = *timestamp;
        current = Some(*status);
    }
    coverage.record(current, interval.end - cursor);

    coverage
}
