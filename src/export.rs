//! CSV artifact written for each completed report.

use crate::model::WindowReport;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Column order of the artifact. All figures are minutes.
pub const REPORT_HEADER: [&str; 7] = [
    "store_id",
    "uptime_last_hour",
    "uptime_last_day",
    "uptime_last_week",
    "downtime_last_hour",
    "downtime_last_day",
    "downtime_last_week",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn write_report<W: Write>(writer: W, rows: &[WindowReport]) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(REPORT_HEADER)?;
    for row in rows {
        wtr.write_record([
            row.store_id.to_string(),
            format_minutes(row.active_minutes_hour),
            format_minutes(row.active_minutes_day),
            format_minutes(row.active_minutes_week),
            format_minutes(row.inactive_minutes_hour),
            format_minutes(row.inactive_minutes_day),
            format_minutes(row.inactive_minutes_week),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn report_to_bytes(rows: &[WindowReport]) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    write_report(&mut buffer, rows)?;
    Ok(buffer)
}

pub fn write_report_file(path: &Path, rows: &[WindowReport]) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_report(std::io::BufWriter::new(file), rows)
}

fn format_minutes(minutes: f64) -> String {
    format!("{minutes:.2}")
}
