use crate::api::ApiState;
use crate::api::responses::{
    ApiErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse, ReportState,
    ReportStatusResponse, TriggerSuccessResponse,
};
use crate::error::AppError;
use crate::jobs::{JobStatus, ReportId, ReportRegistry, spawn_report_job};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const STORE_WARNINGS_HEADER: &str = "x-store-warnings";
const DISCARDED_ROWS_HEADER: &str = "x-discarded-rows";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
    /// RFC 3339 snapshot instant; the configured snapshot mode applies when absent.
    pub now: Option<String>,
}

pub enum TriggerResponse {
    Success(TriggerSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for TriggerResponse {
    fn into_response(self) -> Response {
        match self {
            TriggerResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            TriggerResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn trigger_report(
    State(state): State<ApiState>,
    Query(params): Query<TriggerParams>,
) -> impl IntoResponse {
    build_trigger_response(&state, params.now.as_deref())
}

pub enum ReportResponse {
    Artifact {
        report_id: ReportId,
        summary: RunSummary,
        body: Vec<u8>,
    },
    Status(ReportStatusResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for ReportResponse {
    fn into_response(self) -> Response {
        match self {
            ReportResponse::Artifact {
                report_id,
                summary,
                body,
            } => {
                let disposition = format!("attachment; filename=\"report_{report_id}.csv\"");
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "text/csv".to_string()),
                        (header::CONTENT_DISPOSITION, disposition),
                        (
                            HeaderName::from_static(STORE_WARNINGS_HEADER),
                            summary.warnings.to_string(),
                        ),
                        (
                            HeaderName::from_static(DISCARDED_ROWS_HEADER),
                            summary.discarded.to_string(),
                        ),
                    ],
                    body,
                )
                    .into_response()
            }
            ReportResponse::Status(body) => (StatusCode::OK, Json(body)).into_response(),
            ReportResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_report(
    State(state): State<ApiState>,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match lookup_report(&state.registry, &report_id) {
        ReportLookup::Ready {
            report_id,
            path,
            summary,
        } => match tokio::fs::read(&path).await {
            Ok(body) => ReportResponse::Artifact {
                report_id,
                summary,
                body,
            },
            Err(err) => {
                error!(%report_id, path = %path.display(), error = %err, "Failed to read report artifact");
                ReportResponse::Error {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: error_body(
                        ApiErrorCode::ArtifactUnavailable,
                        "Report artifact unavailable",
                    ),
                }
            }
        },
        ReportLookup::InProgress(status) => {
            ReportResponse::Status(ReportStatusResponse { status })
        }
        ReportLookup::NotFound => ReportResponse::Error {
            status: StatusCode::NOT_FOUND,
            body: error_body(ApiErrorCode::ReportNotFound, "Unknown report id"),
        },
        ReportLookup::Internal(message) => {
            error!(message = message, "Internal error while handling /get_report");
            ReportResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: error_body(ApiErrorCode::InternalError, INTERNAL_ERROR_MESSAGE),
            }
        }
    }
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health() -> impl IntoResponse {
    build_health_response(SystemTime::now())
}

fn build_trigger_response(state: &ApiState, now: Option<&str>) -> TriggerResponse {
    let requested_now = match now.map(parse_snapshot).transpose() {
        Ok(requested_now) => requested_now,
        Err(err) => {
            debug!(error = %err, "Rejected report trigger");
            return TriggerResponse::Error {
                status: StatusCode::BAD_REQUEST,
                body: error_body(ApiErrorCode::InvalidSnapshot, err.to_string()),
            };
        }
    };

    match spawn_report_job(&state.registry, Arc::clone(&state.context), requested_now) {
        Ok(report_id) => TriggerResponse::Success(TriggerSuccessResponse {
            report_id: report_id.to_string(),
        }),
        Err(err) => {
            error!(error = %err, "Internal error while handling /trigger_report");
            TriggerResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: error_body(ApiErrorCode::InternalError, INTERNAL_ERROR_MESSAGE),
            }
        }
    }
}

fn parse_snapshot(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| AppError::InvalidSnapshot(format!("{value:?}: {err}")))
}

/// Counts from a completed run, sent alongside the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub warnings: usize,
    pub discarded: usize,
}

#[derive(Debug, PartialEq)]
enum ReportLookup {
    Ready {
        report_id: ReportId,
        path: PathBuf,
        summary: RunSummary,
    },
    InProgress(ReportState),
    NotFound,
    Internal(&'static str),
}

fn lookup_report(registry: &Arc<RwLock<ReportRegistry>>, raw_id: &str) -> ReportLookup {
    let Ok(report_id) = raw_id.trim().parse::<ReportId>() else {
        return ReportLookup::NotFound;
    };
    let guard = match registry.read() {
        Ok(guard) => guard,
        Err(_) => return ReportLookup::Internal("registry lock poisoned while reading report"),
    };
    let Some(job) = guard.job(&report_id) else {
        return ReportLookup::NotFound;
    };

    match job.status {
        JobStatus::Pending => ReportLookup::InProgress(ReportState::Running),
        JobStatus::Failed => ReportLookup::InProgress(ReportState::Failed),
        JobStatus::Cancelled => ReportLookup::InProgress(ReportState::Cancelled),
        JobStatus::Complete => match &job.artifact_path {
            Some(path) => ReportLookup::Ready {
                report_id,
                path: path.clone(),
                summary: RunSummary {
                    warnings: job.warnings.len(),
                    discarded: job.discarded.total(),
                },
            },
            None => ReportLookup::Internal("complete report without artifact"),
        },
    }
}

fn build_health_response(now: SystemTime) -> HealthResponse {
    match format_timestamp(now) {
        Ok(timestamp) => HealthResponse::Success(HealthSuccessResponse {
            status: HealthStatus::Ok,
            timestamp,
        }),
        Err(err) => {
            error!(error = %err, "Internal error while handling /api/health");
            HealthResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: error_body(ApiErrorCode::InternalError, INTERNAL_ERROR_MESSAGE),
            }
        }
    }
}

fn error_body(error_code: ApiErrorCode, message: impl Into<String>) -> ErrorResponse {
    let timestamp = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ErrorResponse {
        error_code,
        error_message: message.into(),
        timestamp,
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::ingest::InMemorySource;
    use crate::jobs::{JobContext, SnapshotMode};
    use crate::model::{Observation, StoreStatus, TimezoneMapping};
    use chrono::TimeZone;
    use std::time::{Duration, UNIX_EPOCH};

    fn test_state(label: &str) -> ApiState {
        let now = Utc
            .with_ymd_and_hms(2023, 1, 25, 12, 0, 0)
            .single()
            .expect("valid instant");
        let source = InMemorySource {
            observations: vec![Observation {
                store_id: 7,
                timestamp_utc: now - chrono::TimeDelta::minutes(30),
                status: StoreStatus::Active,
            }],
            timezones: vec![TimezoneMapping {
                store_id: 7,
                zone_id: "Nowhere/Zone".to_string(),
            }],
            ..InMemorySource::default()
        };
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        ApiState {
            registry: Arc::new(RwLock::new(ReportRegistry::new())),
            context: Arc::new(JobContext {
                source: Arc::new(source),
                options: EngineOptions::default(),
                output_dir: std::env::temp_dir().join(format!("store-uptime-api-{label}-{unique}")),
                snapshot_mode: SnapshotMode::LatestObservation,
            }),
        }
    }

    #[test]
    fn trigger_rejects_malformed_snapshot() {
        let state = test_state("bad-now");

        let response = build_trigger_response(&state, Some("last tuesday"));

        match response {
            TriggerResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body.error_code, ApiErrorCode::InvalidSnapshot);
            }
            TriggerResponse::Success(_) => panic!("expected invalid snapshot error"),
        }
        assert!(state.registry.read().expect("registry lock").is_empty());
    }

    #[test]
    fn lookup_maps_job_status() {
        let registry = Arc::new(RwLock::new(ReportRegistry::new()));
        let (pending_id, _) = registry.write().expect("registry lock").insert_pending();
        let (failed_id, _) = registry.write().expect("registry lock").insert_pending();
        registry
            .write()
            .expect("registry lock")
            .fail(&failed_id, "boom".to_string())
            .expect("known report");

        assert_eq!(
            lookup_report(&registry, &pending_id.to_string()),
            ReportLookup::InProgress(ReportState::Running)
        );
        assert_eq!(
            lookup_report(&registry, &failed_id.to_string()),
            ReportLookup::InProgress(ReportState::Failed)
        );
    }

    #[test]
    fn lookup_unknown_or_garbage_id_is_not_found() {
        let registry = Arc::new(RwLock::new(ReportRegistry::new()));

        assert_eq!(
            lookup_report(&registry, &uuid::Uuid::new_v4().to_string()),
            ReportLookup::NotFound
        );
        assert_eq!(lookup_report(&registry, "report-1"), ReportLookup::NotFound);
    }

    #[test]
    fn lookup_returns_internal_error_when_lock_poisoned() {
        let registry = Arc::new(RwLock::new(ReportRegistry::new()));
        let report_id = registry.write().expect("registry lock").insert_pending().0;
        let registry_for_thread = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = registry_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();

        assert!(matches!(
            lookup_report(&registry, &report_id.to_string()),
            ReportLookup::Internal(_)
        ));
    }

    #[test]
    fn health_reports_ok_with_timestamp() {
        match build_health_response(UNIX_EPOCH + Duration::from_secs(1)) {
            HealthResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            HealthResponse::Error { status, .. } => {
                panic!("expected health success, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn triggered_report_is_served_as_csv() -> Result<(), Box<dyn std::error::Error>> {
        let state = test_state("serve");

        let report_id = match build_trigger_response(&state, Some("2023-01-25T12:00:00Z")) {
            TriggerResponse::Success(body) => body.report_id,
            TriggerResponse::Error { status, .. } => panic!("trigger failed: {status}"),
        };
        let parsed: ReportId = report_id.parse()?;
        let mut receiver = state
            .registry
            .read()
            .map_err(|_| AppError::RegistryLock)?
            .subscribe(&parsed)
            .ok_or_else(|| AppError::UnknownReport(report_id.clone()))?;
        let finished = *receiver.wait_for(|status| status.is_finished()).await?;
        assert_eq!(finished, JobStatus::Complete);

        let response = get_report(State(state.clone()), Path(report_id.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/csv"[..])
        );
        assert_eq!(
            response.headers().get(STORE_WARNINGS_HEADER).map(|v| v.as_bytes()),
            Some(&b"1"[..])
        );
        assert_eq!(
            response.headers().get(DISCARDED_ROWS_HEADER).map(|v| v.as_bytes()),
            Some(&b"0"[..])
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let text = String::from_utf8(body.to_vec())?;
        let mut lines = text.lines();
        assert!(lines.next().is_some_and(|header| header.starts_with("store_id,")));
        assert_eq!(lines.next(), Some("7,60.00,1440.00,10080.00,0.00,0.00,0.00"));

        let _ = std::fs::remove_dir_all(&state.context.output_dir);
        Ok(())
    }
}
