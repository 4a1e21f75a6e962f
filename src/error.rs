use crate::engine::EngineError;
use crate::export::ExportError;
use crate::ingest::IngestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("invalid snapshot instant: {0}")]
    InvalidSnapshot(String),
    #[error("unknown report: {0}")]
    UnknownReport(String),
    #[error("report registry lock poisoned")]
    RegistryLock,
}
