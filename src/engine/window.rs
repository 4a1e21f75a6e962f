//! Per-store aggregation over the hour, day and week windows.

use super::intervals::{UtcInterval, business_intervals};
use super::interpolation::{Coverage, MissingStatusPolicy, StatusTimeline, estimate};
use super::schedule::WeeklySchedule;
use crate::model::{StoreId, Window, WindowReport};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Everything the aggregator needs to know about one store besides its
/// samples.
#[derive(Debug, Clone)]
pub struct StoreProfile {
    pub schedule: WeeklySchedule,
    pub tz: Tz,
}

/// Coverage of the store's business time inside one window ending at `now`.
pub fn window_coverage(
    now: DateTime<Utc>,
    window: Window,
    profile: &StoreProfile,
    timeline: &StatusTimeline,
    policy: MissingStatusPolicy,
) -> Coverage {
    let mut total = Coverage::default();
    let Some(bounds) = UtcInterval::ending_at(now, window.length()) else {
        return total;
    };

    for interval in business_intervals(bounds, &profile.schedule, profile.tz) {
        total += estimate(timeline, &interval, policy);
    }
    total
}

pub fn aggregate_store(
    store_id: StoreId,
    now: DateTime<Utc>,
    profile: &StoreProfile,
    timeline: &StatusTimeline,
    policy: MissingStatusPolicy,
) -> WindowReport {
    let mut report = WindowReport::empty(store_id);
    for window in Window::ALL {
        let coverage = window_coverage(now, window, profile, timeline, policy);
        debug!(
            store_id,
            window = ?window,
            active_secs = coverage.active.num_seconds(),
            inactive_secs = coverage.inactive.num_seconds(),
            unknown_secs = coverage.unknown.num_seconds(),
            "Window aggregated"
        );
        let active = minutes(coverage.active);
        let inactive = minutes(coverage.inactive);
        match window {
            Window::Hour => {
                report.active_minutes_hour = active;
                report.inactive_minutes_hour = inactive;
            }
            Window::Day => {
                report.active_minutes_day = active;
                report.inactive_minutes_day = inactive;
            }
            Window::Week => {
                report.active_minutes_week = active;
                report.inactive_minutes_week = inactive;
            }
        }
    }
    report
}

fn minutes(duration: TimeDelta) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}
