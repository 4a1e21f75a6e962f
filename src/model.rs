//! Domain types shared by ingestion, the estimation engine and the report layer.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type StoreId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Active,
    Inactive,
}

impl StoreStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown store status: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for StoreStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// One status poll for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub store_id: StoreId,
    pub timestamp_utc: DateTime<Utc>,
    pub status: StoreStatus,
}

/// Opening hours for one weekday, in the store's local wall clock.
///
/// `day_of_week` counts from Monday = 0. A rule whose `close_time_local` is
/// earlier than `open_time_local` spans midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    pub store_id: StoreId,
    pub day_of_week: u8,
    pub open_time_local: NaiveTime,
    pub close_time_local: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneMapping {
    pub store_id: StoreId,
    pub zone_id: String,
}

/// Rolling lookback windows ending at the snapshot instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
    Week,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Hour, Window::Day, Window::Week];

    pub fn length(self) -> TimeDelta {
        match self {
            Window::Hour => TimeDelta::hours(1),
            Window::Day => TimeDelta::days(1),
            Window::Week => TimeDelta::weeks(1),
        }
    }

    pub fn length_minutes(self) -> f64 {
        self.length().num_seconds() as f64 / 60.0
    }
}

/// Per-store output row. Every figure is in minutes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub store_id: StoreId,
    pub active_minutes_hour: f64,
    pub active_minutes_day: f64,
    pub active_minutes_week: f64,
    pub inactive_minutes_hour: f64,
    pub inactive_minutes_day: f64,
    pub inactive_minutes_week: f64,
}

impl WindowReport {
    pub fn empty(store_id: StoreId) -> Self {
        Self {
            store_id,
            active_minutes_hour: 0.0,
            active_minutes_day: 0.0,
            active_minutes_week: 0.0,
            inactive_minutes_hour: 0.0,
            inactive_minutes_day: 0.0,
            inactive_minutes_week: 0.0,
        }
    }

    pub fn active_minutes(&self, window: Window) -> f64 {
        match window {
            Window::Hour => self.active_minutes_hour,
            Window::Day => self.active_minutes_day,
            Window::Week => self.active_minutes_week,
        }
    }

    pub fn inactive_minutes(&self, window: Window) -> f64 {
        match window {
            Window::Hour => self.inactive_minutes_hour,
            Window::Day => self.inactive_minutes_day,
            Window::Week => self.inactive_minutes_week,
        }
    }
}
