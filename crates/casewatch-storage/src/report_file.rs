use crate::{write_atomic, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct ReportDocument<'a, R: Serialize> {
    generated_at: DateTime<Utc>,
    columns: &'a [&'a str],
    rows: &'a [R],
}

/// A tabular report as read back from disk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StoredReport {
    pub generated_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

pub fn write_report<R: Serialize>(
    path: &Path,
    generated_at: DateTime<Utc>,
    columns: &[&str],
    rows: &[R],
) -> Result<(), StorageError> {
    let document = ReportDocument {
        generated_at,
        columns,
        rows,
    };
    let payload = serde_json::to_string_pretty(&document)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    write_atomic(path, payload.as_bytes())
}

pub fn load_report(path: &Path) -> Result<StoredReport, StorageError> {
    let content = fs::read_to_string(path).map_err(|err| StorageError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    serde_json::from_str(&content).map_err(|err| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Serialize)]
    struct Row {
        process_number: &'static str,
        has_artifact: bool,
    }

    #[test]
    fn report_keeps_row_order_and_columns() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out/report.json");
        let generated_at = Utc
            .with_ymd_and_hms(2025, 6, 2, 6, 0, 0)
            .single()
            .expect("valid timestamp");

        write_report(
            &path,
            generated_at,
            &["process_number", "has_artifact"],
            &[
                Row {
                    process_number: "0002/2025",
                    has_artifact: true,
                },
                Row {
                    process_number: "0001/2025",
                    has_artifact: false,
                },
            ],
        )
        .expect("write report");

        let stored = load_report(&path).expect("load report");
        assert_eq!(stored.generated_at, generated_at);
        assert_eq!(stored.columns, vec!["process_number", "has_artifact"]);
        assert_eq!(stored.rows.len(), 2);
        assert_eq!(stored.rows[0]["process_number"], "0002/2025");
        assert_eq!(stored.rows[1]["has_artifact"], false);
    }
}
