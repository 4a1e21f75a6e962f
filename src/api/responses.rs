use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerSuccessResponse {
    pub report_id: String,
}

/// Body returned by `/get_report` while no artifact can be served.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportStatusResponse {
    pub status: ReportState,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ReportState {
    Running,
    Failed,
    Cancelled,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    InvalidSnapshot,
    ReportNotFound,
    ArtifactUnavailable,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}
