use casewatch_core::{Category, Record, RecordKey};
use casewatch_pipeline::{ArtifactFetch, CaseSource, SourceError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads records from a JSON array exported by the portal scraper and copies
/// pre-downloaded artifacts out of a local directory.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot_path: PathBuf,
    artifact_source: Option<PathBuf>,
}

impl SnapshotSource {
    pub fn new(snapshot_path: impl Into<PathBuf>, artifact_source: Option<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            artifact_source,
        }
    }
}

impl CaseSource for SnapshotSource {
    fn collect(&mut self) -> Result<Vec<Record>, SourceError> {
        read_snapshot(&self.snapshot_path)
    }

    fn fetch_artifact(
        &mut self,
        record: &Record,
        destination_dir: &Path,
    ) -> Result<ArtifactFetch, SourceError> {
        let Some(source_dir) = &self.artifact_source else {
            return Ok(ArtifactFetch::failed("no artifact source configured"));
        };

        let file_name = artifact_file_name(&record.key());
        let origin = source_dir.join(&file_name);
        if !origin.is_file() {
            return Ok(ArtifactFetch::failed(format!(
                "artifact not found at {}",
                origin.display()
            )));
        }

        let target = destination_dir.join(&file_name);
        match fs::copy(&origin, &target) {
            Ok(_) => Ok(ArtifactFetch::stored(target)),
            Err(err) => Ok(ArtifactFetch::failed(format!(
                "artifact copy failed: {err}"
            ))),
        }
    }
}

pub fn read_snapshot(path: &Path) -> Result<Vec<Record>, SourceError> {
    let content = fs::read_to_string(path).map_err(|err| {
        SourceError::new(format!("failed to read snapshot {}: {err}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|err| {
        SourceError::new(format!("failed to parse snapshot {}: {err}", path.display()))
    })
}

/// Record keys contain `/` and `.` (process numbers); artifacts are stored
/// under a flattened name.
pub fn artifact_file_name(key: &RecordKey) -> String {
    let stem: String = key
        .as_str()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.pdf")
}

const DUPLICATE_DISPLAY_CAP: usize = 10;
const CATEGORY_DISPLAY_CAP: usize = 20;

/// Repeated values in first-occurrence order with their counts.
pub fn duplicates<'a, I>(values: I) -> Vec<(&'a str, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut order = Vec::new();
    for value in values {
        let count = counts.entry(value).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    order
        .into_iter()
        .filter_map(|value| {
            let count = counts[value];
            (count > 1).then_some((value, count))
        })
        .collect()
}

/// Human-readable inventory of a snapshot: category counts, duplicate
/// numbers and ids, and the first records of each category.
pub fn render_listing(records: &[Record]) -> String {
    let mut lines = vec!["=== SUMMARY ===".to_string()];
    for category in Category::ALL {
        let count = records.iter().filter(|r| r.category == category).count();
        lines.push(format!("   - {category}: {count} record(s)"));
    }
    lines.push(format!("   - total: {} record(s)", records.len()));

    let by_number = duplicates(records.iter().map(|r| r.process_number.as_str()));
    lines.push(String::new());
    if by_number.is_empty() {
        lines.push("No duplicate process numbers.".to_string());
    } else {
        lines.push(format!(
            "Duplicate process numbers: {}",
            by_number.len()
        ));
        push_capped(&mut lines, &by_number, "", "duplicate(s)");
    }

    let by_id = duplicates(records.iter().filter_map(|r| r.process_id.as_deref()));
    if !by_id.is_empty() {
        lines.push(format!("Duplicate process ids: {}", by_id.len()));
        push_capped(&mut lines, &by_id, "id ", "duplicate(s)");
    }

    for category in Category::ALL {
        let members: Vec<&Record> = records.iter().filter(|r| r.category == category).collect();
        lines.push(String::new());
        lines.push(format!(
            "=== FIRST {CATEGORY_DISPLAY_CAP} {} ===",
            category.as_str().to_uppercase()
        ));
        for (index, record) in members.iter().take(CATEGORY_DISPLAY_CAP).enumerate() {
            lines.push(format!(
                "   {:2}. {:25} | id: {} | category: {}",
                index + 1,
                record.process_number,
                record.process_id.as_deref().unwrap_or("-"),
                record.category
            ));
        }
        if members.len() > CATEGORY_DISPLAY_CAP {
            lines.push(format!(
                "   ... and {} more {} record(s)",
                members.len() - CATEGORY_DISPLAY_CAP,
                category
            ));
        }
    }

    lines.join("\n")
}

fn push_capped(lines: &mut Vec<String>, entries: &[(&str, usize)], prefix: &str, noun: &str) {
    for (value, count) in entries.iter().take(DUPLICATE_DISPLAY_CAP) {
        lines.push(format!("   - {prefix}{value}: appears {count} time(s)"));
    }
    if entries.len() > DUPLICATE_DISPLAY_CAP {
        lines.push(format!(
            "   ... and {} more {noun}",
            entries.len() - DUPLICATE_DISPLAY_CAP
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, number: &str, category: Category) -> Record {
        Record::new(id, number, category)
    }

    #[test]
    fn artifact_names_are_flattened() {
        assert_eq!(
            artifact_file_name(&RecordKey::from("12345.000001/2025-11")),
            "12345_000001_2025-11.pdf"
        );
    }

    #[test]
    fn collects_records_and_copies_artifacts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let snapshot = dir.path().join("snapshot.json");
        fs::write(
            &snapshot,
            r#"[
                {"process_id": "P1", "process_number": "0001/2025", "category": "received", "markers": ["A"]},
                {"process_id": "P2", "process_number": "0002/2025", "category": "generated"}
            ]"#,
        )
        .expect("write snapshot");

        let artifacts = dir.path().join("downloads");
        fs::create_dir_all(&artifacts).expect("create downloads");
        fs::write(artifacts.join("P1.pdf"), b"%PDF-1.4").expect("write artifact");

        let destination = dir.path().join("out");
        fs::create_dir_all(&destination).expect("create out");

        let mut source = SnapshotSource::new(&snapshot, Some(artifacts));
        let records = source.collect().expect("collect");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].category, Category::Generated);

        let fetched = source
            .fetch_artifact(&records[0], &destination)
            .expect("fetch");
        assert!(fetched.success);
        assert_eq!(fetched.path, Some(destination.join("P1.pdf")));
        assert!(destination.join("P1.pdf").exists());

        let missing = source
            .fetch_artifact(&records[1], &destination)
            .expect("fetch");
        assert!(!missing.success);
        assert!(missing.error.unwrap_or_default().contains("not found"));
    }

    #[test]
    fn unreadable_snapshot_is_a_source_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{\"not\": \"an array\"}").expect("write snapshot");

        let err = read_snapshot(&path).expect_err("object is not a snapshot");
        assert!(err.to_string().contains("failed to parse snapshot"));
    }

    #[test]
    fn duplicates_keep_first_occurrence_order() {
        let found = duplicates(["b", "a", "b", "c", "a", "b"]);
        assert_eq!(found, vec![("b", 3), ("a", 2)]);
    }

    #[test]
    fn listing_reports_counts_and_duplicates() {
        let mut records = vec![
            record("P1", "0001/2025", Category::Received),
            record("P2", "0001/2025", Category::Received),
            record("P2", "0003/2025", Category::Generated),
        ];
        for i in 0..22 {
            records.push(record(&format!("R{i}"), &format!("1{i:03}/2025"), Category::Received));
        }

        let listing = render_listing(&records);
        assert!(listing.contains("   - received: 24 record(s)"));
        assert!(listing.contains("   - generated: 1 record(s)"));
        assert!(listing.contains("Duplicate process numbers: 1"));
        assert!(listing.contains("   - 0001/2025: appears 2 time(s)"));
        assert!(listing.contains("   - id P2: appears 2 time(s)"));
        assert!(listing.contains("   ... and 4 more received record(s)"));
    }
}
