use crate::report::{ReportRow, REPORT_COLUMNS};
use casewatch_storage::{write_report, StorageError};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery configuration error: {0}")]
    Configuration(String),
    #[error("delivery transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body_text: String,
    pub body_markup: String,
    pub attachment: Option<PathBuf>,
}

/// Best-effort transport for the run notification.
pub trait Notifier {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}

pub trait ReportWriter {
    fn write(&mut self, rows: &[ReportRow], destination: &Path) -> Result<(), StorageError>;
}

/// Writes the tabular report as a JSON document with a column header list.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportWriter;

impl ReportWriter for JsonReportWriter {
    fn write(&mut self, rows: &[ReportRow], destination: &Path) -> Result<(), StorageError> {
        write_report(destination, Utc::now(), &REPORT_COLUMNS, rows)
    }
}
