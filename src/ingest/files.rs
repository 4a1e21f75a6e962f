//! CSV exports in the layout produced by the store polling pipeline.
//!
//! - observations: `store_id,status,timestamp_utc`
//! - schedules: `store_id,dayOfWeek,start_time_local,end_time_local`
//! - timezones: `store_id,timezone_str`

use super::{DataSource, IngestError, Loaded};
use crate::model::{Observation, ScheduleRule, StoreId, TimezoneMapping};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CsvDataSource {
    observations_path: PathBuf,
    schedules_path: PathBuf,
    timezones_path: PathBuf,
}

impl CsvDataSource {
    pub fn new(
        observations_path: impl Into<PathBuf>,
        schedules_path: impl Into<PathBuf>,
        timezones_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            observations_path: observations_path.into(),
            schedules_path: schedules_path.into(),
            timezones_path: timezones_path.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    store_id: String,
    status: String,
    timestamp_utc: String,
}

#[derive(Debug, Deserialize)]
struct HoursRow {
    store_id: String,
    #[serde(rename = "dayOfWeek", alias = "day_of_week")]
    day_of_week: String,
    start_time_local: String,
    end_time_local: String,
}

#[derive(Debug, Deserialize)]
struct ZoneRow {
    store_id: String,
    #[serde(alias = "zone_id")]
    timezone_str: String,
}

impl DataSource for CsvDataSource {
    fn load_observations(
        &self,
        stores: Option<&HashSet<StoreId>>,
    ) -> Result<Loaded<Observation>, IngestError> {
        let mut loaded = read_rows(&self.observations_path, |row: StatusRow| {
            Some(Observation {
                store_id: parse_store_id(&row.store_id)?,
                status: row.status.parse().ok()?,
                timestamp_utc: parse_timestamp(&row.timestamp_utc)?,
            })
        })?;
        if let Some(ids) = stores {
            loaded
                .records
                .retain(|observation| ids.contains(&observation.store_id));
        }
        Ok(loaded)
    }

    fn load_schedules(&self) -> Result<Loaded<ScheduleRule>, IngestError> {
        read_rows(&self.schedules_path, |row: HoursRow| {
            Some(ScheduleRule {
                store_id: parse_store_id(&row.store_id)?,
                day_of_week: row.day_of_week.trim().parse().ok()?,
                open_time_local: parse_time_of_day(&row.start_time_local)?,
                close_time_local: parse_time_of_day(&row.end_time_local)?,
            })
        })
    }

    fn load_timezones(&self) -> Result<Loaded<TimezoneMapping>, IngestError> {
        read_rows(&self.timezones_path, |row: ZoneRow| {
            Some(TimezoneMapping {
                store_id: parse_store_id(&row.store_id)?,
                zone_id: row.timezone_str.trim().to_string(),
            })
        })
    }
}

fn read_rows<R, T, F>(path: &Path, mut convert: F) -> Result<Loaded<T>, IngestError>
where
    R: DeserializeOwned,
    F: FnMut(R) -> Option<T>,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut records = Vec::new();
    let mut discarded = 0;
    for (index, result) in reader.deserialize::<R>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) if err.is_io_error() => {
                return Err(IngestError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                warn!(path = %path.display(), line = index + 2, error = %err, "Skipping unreadable row");
                discarded += 1;
                continue;
            }
        };
        match convert(row) {
            Some(record) => records.push(record),
            None => {
                warn!(path = %path.display(), line = index + 2, "Skipping malformed row");
                discarded += 1;
            }
        }
    }

    debug!(
        path = %path.display(),
        records = records.len(),
        discarded,
        "CSV file loaded"
    );
    Ok(Loaded { records, discarded })
}

fn parse_store_id(value: &str) -> Option<StoreId> {
    value.trim().parse().ok()
}

/// Accepts RFC 3339 as well as `2023-01-22 12:09:39.388884 UTC`, with or
/// without the trailing zone name (always UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = value.strip_suffix("UTC").map(str::trim_end).unwrap_or(value);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|parsed| parsed.and_utc())
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}
