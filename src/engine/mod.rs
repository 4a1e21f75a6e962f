use crate::model::{Observation, ScheduleRule, StoreId, TimezoneMapping, Window, WindowReport};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

pub mod interpolation;
pub mod intervals;
pub mod schedule;
pub mod timezone;
pub mod window;

use interpolation::{MissingStatusPolicy, StatusTimeline};
use intervals::UtcInterval;
use schedule::{ScheduleIssue, SchedulePolicy, WeeklySchedule};
use timezone::{ZoneFallback, resolve_zone};
use window::{StoreProfile, aggregate_store};

pub const DEFAULT_ZONE: Tz = chrono_tz::America::Chicago;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Zone for stores without a usable mapping.
    pub default_zone: Tz,
    pub missing_status: MissingStatusPolicy,
    pub schedule: SchedulePolicy,
    /// Report stores that have schedule or timezone rows but no samples.
    pub include_unobserved_stores: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_zone: DEFAULT_ZONE,
            missing_status: MissingStatusPolicy::default(),
            schedule: SchedulePolicy::default(),
            include_unobserved_stores: false,
        }
    }
}

/// Rows dropped by the loader before they reached the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardTally {
    pub observations: usize,
    pub schedule_rules: usize,
    pub timezones: usize,
}

impl DiscardTally {
    pub fn total(&self) -> usize {
        self.observations + self.schedule_rules + self.timezones
    }
}

/// Fully materialized inputs of one report run.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    pub observations: Vec<Observation>,
    pub schedules: Vec<ScheduleRule>,
    pub timezones: Vec<TimezoneMapping>,
    pub discarded: DiscardTally,
}

impl InputSnapshot {
    pub fn latest_observation(&self) -> Option<DateTime<Utc>> {
        self.observations
            .iter()
            .map(|observation| observation.timestamp_utc)
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreIssue {
    #[error("schedule rejected, store treated as always open: {0}")]
    Schedule(#[from] ScheduleIssue),
    #[error("default timezone used: {0}")]
    Timezone(#[from] ZoneFallback),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWarning {
    pub store_id: StoreId,
    pub issue: StoreIssue,
}

#[derive(Debug, Clone)]
pub struct ReportRun {
    pub now: DateTime<Utc>,
    /// Ordered by store id.
    pub rows: Vec<WindowReport>,
    pub warnings: Vec<StoreWarning>,
    pub discarded: DiscardTally,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("snapshot instant {0} is too early for a one-week lookback")]
    SnapshotOutOfRange(DateTime<Utc>),
    #[error("report run cancelled")]
    Cancelled,
}

pub fn compute_report(
    now: DateTime<Utc>,
    input: &InputSnapshot,
    options: &EngineOptions,
) -> Result<ReportRun, EngineError> {
    compute_report_cancellable(now, input, options, &AtomicBool::new(false))
}

/// Compute one row per store, checking `cancel` before each store.
///
/// Problems with a single store's schedule or timezone degrade that store to
/// defaults and are returned as warnings; they never fail the run.
pub fn compute_report_cancellable(
    now: DateTime<Utc>,
    input: &InputSnapshot,
    options: &EngineOptions,
    cancel: &AtomicBool,
) -> Result<ReportRun, EngineError> {
    if UtcInterval::ending_at(now, Window::Week.length()).is_none() {
        return Err(EngineError::SnapshotOutOfRange(now));
    }
    let started = Instant::now();

    let mut observations: HashMap<StoreId, Vec<&Observation>> = HashMap::new();
    for observation in &input.observations {
        observations
            .entry(observation.store_id)
            .or_default()
            .push(observation);
    }
    let mut rules: HashMap<StoreId, Vec<&ScheduleRule>> = HashMap::new();
    for rule in &input.schedules {
        rules.entry(rule.store_id).or_default().push(rule);
    }
    let mut zones: HashMap<StoreId, Vec<&str>> = HashMap::new();
    for mapping in &input.timezones {
        zones
            .entry(mapping.store_id)
            .or_default()
            .push(mapping.zone_id.as_str());
    }

    let mut store_ids: BTreeSet<StoreId> = observations.keys().copied().collect();
    if options.include_unobserved_stores {
        store_ids.extend(rules.keys().copied());
        store_ids.extend(zones.keys().copied());
    }
    let store_ids: Vec<StoreId> = store_ids.into_iter().collect();

    let evaluated = store_ids
        .par_iter()
        .map(|&store_id| {
            if cancel.load(Ordering::Relaxed) {
                return Err(EngineError::Cancelled);
            }
            Ok(evaluate_store(
                store_id,
                now,
                observations.get(&store_id).map(Vec::as_slice).unwrap_or(&[]),
                rules.get(&store_id).map(Vec::as_slice).unwrap_or(&[]),
                zones.get(&store_id).map(Vec::as_slice).unwrap_or(&[]),
                options,
            ))
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let mut rows = Vec::with_capacity(evaluated.len());
    let mut warnings = Vec::new();
    for (row, store_warnings) in evaluated {
        rows.push(row);
        warnings.extend(store_warnings);
    }

    info!(
        now = %now,
        stores = rows.len(),
        warnings = warnings.len(),
        discarded = input.discarded.total(),
        elapsed_ms = started.elapsed().as_millis(),
        "Report computed"
    );

    Ok(ReportRun {
        now,
        rows,
        warnings,
        discarded: input.discarded,
    })
}

fn evaluate_store(
    store_id: StoreId,
    now: DateTime<Utc>,
    observations: &[&Observation],
    rules: &[&ScheduleRule],
    zone_ids: &[&str],
    options: &EngineOptions,
) -> (WindowReport, Vec<StoreWarning>) {
    let mut warnings = Vec::new();

    let schedule = match WeeklySchedule::from_rules(rules.iter().copied(), &options.schedule) {
        Ok(schedule) => schedule,
        Err(issue) => {
            warn!(store_id, error = %issue, "Invalid schedule, treating store as always open");
            warnings.push(StoreWarning {
                store_id,
                issue: issue.into(),
            });
            WeeklySchedule::always_open()
        }
    };

    let (tz, fallback) = resolve_zone(zone_ids, options.default_zone);
    if let Some(fallback) = fallback {
        warn!(
            store_id,
            error = %fallback,
            default_zone = %options.default_zone,
            "Unusable timezone mapping, using default zone"
        );
        warnings.push(StoreWarning {
            store_id,
            issue: fallback.into(),
        });
    }

    let timeline = StatusTimeline::from_observations(observations.iter().copied());
    let profile = StoreProfile { schedule, tz };
    let row = aggregate_store(store_id, now, &profile, &timeline, options.missing_status);
    (row, warnings)
}
