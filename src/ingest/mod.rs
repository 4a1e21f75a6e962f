//! Loading observations, schedules and timezones for a report run.

use crate::engine::{DiscardTally, InputSnapshot};
use crate::model::{Observation, ScheduleRule, StoreId, TimezoneMapping};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

pub mod files;

pub use files::CsvDataSource;

/// Records read from a source plus the number of rows that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub discarded: usize,
}

impl<T> Loaded<T> {
    pub fn clean(records: Vec<T>) -> Self {
        Self {
            records,
            discarded: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Storage collaborator the report engine reads from.
///
/// Malformed rows are skipped and counted in [`Loaded::discarded`]; only
/// failures to reach the data at all are errors.
pub trait DataSource: Send + Sync {
    /// Observations for the given stores, or for every store when `None`.
    fn load_observations(
        &self,
        stores: Option<&HashSet<StoreId>>,
    ) -> Result<Loaded<Observation>, IngestError>;
    fn load_schedules(&self) -> Result<Loaded<ScheduleRule>, IngestError>;
    fn load_timezones(&self) -> Result<Loaded<TimezoneMapping>, IngestError>;
}

/// Read all three inputs into one immutable snapshot.
pub fn load_snapshot(source: &dyn DataSource) -> Result<InputSnapshot, IngestError> {
    let observations = source.load_observations(None)?;
    let schedules = source.load_schedules()?;
    let timezones = source.load_timezones()?;

    let discarded = DiscardTally {
        observations: observations.discarded,
        schedule_rules: schedules.discarded,
        timezones: timezones.discarded,
    };
    if discarded.total() > 0 {
        warn!(
            observations = discarded.observations,
            schedule_rules = discarded.schedule_rules,
            timezones = discarded.timezones,
            "Malformed input rows discarded"
        );
    }
    info!(
        observations = observations.records.len(),
        schedule_rules = schedules.records.len(),
        timezones = timezones.records.len(),
        "Input snapshot loaded"
    );

    Ok(InputSnapshot {
        observations: observations.records,
        schedules: schedules.records,
        timezones: timezones.records,
        discarded,
    })
}

/// Source backed by vectors already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    pub observations: Vec<Observation>,
    pub schedules: Vec<ScheduleRule>,
    pub timezones: Vec<TimezoneMapping>,
}

impl DataSource for InMemorySource {
    fn load_observations(
        &self,
        stores: Option<&HashSet<StoreId>>,
    ) -> Result<Loaded<Observation>, IngestError> {
        let records = self
            .observations
            .iter()
            .filter(|observation| stores.is_none_or(|ids| ids.contains(&observation.store_id)))
            .cloned()
            .collect();
        Ok(Loaded::clean(records))
    }

    fn load_schedules(&self) -> Result<Loaded<ScheduleRule>, IngestError> {
        Ok(Loaded::clean(self.schedules.clone()))
    }

    fn load_timezones(&self) -> Result<Loaded<TimezoneMapping>, IngestError> {
        Ok(Loaded::clean(self.timezones.clone()))
    }
}
