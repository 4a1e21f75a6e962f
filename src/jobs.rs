use crate::engine::{
    DiscardTally, EngineError, EngineOptions, ReportRun, StoreWarning, compute_report_cancellable,
};
use crate::error::AppError;
use crate::export::{ExportError, write_report_file};
use crate::ingest::{DataSource, load_snapshot};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type ReportId = Uuid;

/// Where the snapshot instant comes from when the caller does not pass one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    #[default]
    WallClock,
    /// Latest observation in the loaded data; useful for historical exports.
    LatestObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportJob {
    pub report_id: ReportId,
    pub status: JobStatus,
    pub requested_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub snapshot: Option<DateTime<Utc>>,
    pub artifact_path: Option<PathBuf>,
    pub rows: usize,
    /// Stores that fell back to a default schedule or zone.
    pub warnings: Vec<StoreWarning>,
    /// Input rows dropped by the loader.
    pub discarded: DiscardTally,
    pub error: Option<String>,
}

#[derive(Debug)]
struct JobEntry {
    job: ReportJob,
    status_tx: watch::Sender<JobStatus>,
    cancel: Arc<AtomicBool>,
}

/// In-process record of requested reports.
#[derive(Debug, Default)]
pub struct ReportRegistry {
    jobs: HashMap<ReportId, JobEntry>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job and hand back its cancel flag.
    pub fn insert_pending(&mut self) -> (ReportId, Arc<AtomicBool>) {
        let report_id = Uuid::new_v4();
        let (status_tx, _status_rx) = watch::channel(JobStatus::Pending);
        let cancel = Arc::new(AtomicBool::new(false));
        self.jobs.insert(
            report_id,
            JobEntry {
                job: ReportJob {
                    report_id,
                    status: JobStatus::Pending,
                    requested_at: SystemTime::now(),
                    completed_at: None,
                    snapshot: None,
                    artifact_path: None,
                    rows: 0,
                    warnings: Vec::new(),
                    discarded: DiscardTally::default(),
                    error: None,
                },
                status_tx,
                cancel: Arc::clone(&cancel),
            },
        );
        (report_id, cancel)
    }

    pub fn job(&self, report_id: &ReportId) -> Option<&ReportJob> {
        self.jobs.get(report_id).map(|entry| &entry.job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn subscribe(&self, report_id: &ReportId) -> Option<watch::Receiver<JobStatus>> {
        self.jobs
            .get(report_id)
            .map(|entry| entry.status_tx.subscribe())
    }

    pub fn complete(
        &mut self,
        report_id: &ReportId,
        artifact_path: PathBuf,
        run: ReportRun,
    ) -> Result<(), AppError> {
        let entry = self.entry_mut(report_id)?;
        entry.job.snapshot = Some(run.now);
        entry.job.artifact_path = Some(artifact_path);
        entry.job.rows = run.rows.len();
        entry.job.warnings = run.warnings;
        entry.job.discarded = run.discarded;
        Self::finish(entry, JobStatus::Complete);
        Ok(())
    }

    pub fn fail(&mut self, report_id: &ReportId, reason: String) -> Result<(), AppError> {
        let entry = self.entry_mut(report_id)?;
        entry.job.error = Some(reason);
        Self::finish(entry, JobStatus::Failed);
        Ok(())
    }

    pub fn mark_cancelled(&mut self, report_id: &ReportId) -> Result<(), AppError> {
        let entry = self.entry_mut(report_id)?;
        Self::finish(entry, JobStatus::Cancelled);
        Ok(())
    }

    pub fn cancel_all(&self) {
        for entry in self.jobs.values() {
            if !entry.job.status.is_finished() {
                entry.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    fn entry_mut(&mut self, report_id: &ReportId) -> Result<&mut JobEntry, AppError> {
        self.jobs
            .get_mut(report_id)
            .ok_or_else(|| AppError::UnknownReport(report_id.to_string()))
    }

    fn finish(entry: &mut JobEntry, status: JobStatus) {
        let completed_at = SystemTime::now();
        let elapsed = completed_at
            .duration_since(entry.job.requested_at)
            .unwrap_or_default();
        debug!(
            report_id = %entry.job.report_id,
            status = ?status,
            elapsed_ms = elapsed.as_millis(),
            "Report job finished"
        );
        entry.job.status = status;
        entry.job.completed_at = Some(completed_at);
        // Nobody may be listening; the value is still stored.
        entry.status_tx.send_replace(status);
    }
}

/// Collaborators shared by every report job.
pub struct JobContext {
    pub source: Arc<dyn DataSource>,
    pub options: EngineOptions,
    pub output_dir: PathBuf,
    pub snapshot_mode: SnapshotMode,
}

pub fn artifact_path(output_dir: &Path, report_id: &ReportId) -> PathBuf {
    output_dir.join(format!("report_{report_id}.csv"))
}

/// Register a job and compute it on the blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_report_job(
    registry: &Arc<RwLock<ReportRegistry>>,
    context: Arc<JobContext>,
    requested_now: Option<DateTime<Utc>>,
) -> Result<ReportId, AppError> {
    let (report_id, cancel) = {
        let mut guard = registry.write().map_err(|_| AppError::RegistryLock)?;
        guard.insert_pending()
    };
    info!(%report_id, "Report requested");

    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || {
        let outcome = run_report(&context, &report_id, requested_now, &cancel);
        let Ok(mut guard) = registry.write() else {
            error!(%report_id, "Registry lock poisoned while recording report outcome");
            return;
        };
        let recorded = match outcome {
            Ok((path, run)) => {
                info!(
                    %report_id,
                    path = %path.display(),
                    rows = run.rows.len(),
                    warnings = run.warnings.len(),
                    discarded = run.discarded.total(),
                    "Report complete"
                );
                guard.complete(&report_id, path, run)
            }
            Err(AppError::Engine(EngineError::Cancelled)) => {
                warn!(%report_id, "Report cancelled");
                guard.mark_cancelled(&report_id)
            }
            Err(err) => {
                error!(%report_id, error = %err, "Report failed");
                guard.fail(&report_id, err.to_string())
            }
        };
        if let Err(err) = recorded {
            error!(%report_id, error = %err, "Failed to record report outcome");
        }
    });

    Ok(report_id)
}

/// Load, compute and persist one report.
pub fn run_report(
    context: &JobContext,
    report_id: &ReportId,
    requested_now: Option<DateTime<Utc>>,
    cancel: &AtomicBool,
) -> Result<(PathBuf, ReportRun), AppError> {
    let input = load_snapshot(context.source.as_ref())?;
    let now = requested_now
        .or_else(|| match context.snapshot_mode {
            SnapshotMode::WallClock => None,
            SnapshotMode::LatestObservation => input.latest_observation(),
        })
        .unwrap_or_else(Utc::now);

    let run = compute_report_cancellable(now, &input, &context.options, cancel)?;

    std::fs::create_dir_all(&context.output_dir).map_err(ExportError::from)?;
    let path = artifact_path(&context.output_dir, report_id);
    write_report_file(&path, &run.rows)?;
    Ok((path, run))
}
