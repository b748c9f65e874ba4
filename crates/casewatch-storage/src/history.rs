use crate::{write_atomic, StorageError};
use casewatch_core::{HistoryEntry, RecordKey};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// In-memory form of the persisted history file: record key to last observed
/// state. Entries whose record snapshot fails to parse are carried verbatim so
/// a rewrite never drops them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryDocument {
    entries: BTreeMap<RecordKey, HistoryEntry>,
    malformed: BTreeMap<String, Value>,
}

impl HistoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&HistoryEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: RecordKey, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.malformed.remove(key.as_str());
        self.entries.insert(key, entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RecordKey, &HistoryEntry)> {
        self.entries.iter()
    }

    pub fn malformed_keys(&self) -> impl Iterator<Item = &str> {
        self.malformed.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.malformed.is_empty()
    }

    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(object) = value else {
            return Err("history root must be a JSON object".to_string());
        };

        let mut document = Self::new();
        for (key, raw) in object {
            match serde_json::from_value::<HistoryEntry>(raw.clone()) {
                Ok(entry) => {
                    document.entries.insert(RecordKey::new(key), entry);
                }
                Err(err) => {
                    warn!(event = "history_entry_malformed", key = %key, error = %err);
                    document.malformed.insert(key, raw);
                }
            }
        }
        Ok(document)
    }

    pub fn to_value(&self) -> Result<Value, StorageError> {
        let mut object = Map::new();
        for (key, raw) in &self.malformed {
            object.insert(key.clone(), raw.clone());
        }
        for (key, entry) in &self.entries {
            let value = serde_json::to_value(entry)
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
            object.insert(key.as_str().to_string(), value);
        }
        Ok(Value::Object(object))
    }
}

/// `Ok(None)` when the file does not exist. A blank file reads as an empty
/// document; anything that is not a JSON object is [`StorageError::Corrupt`].
pub fn load_history(path: &Path) -> Result<Option<HistoryDocument>, StorageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Some(HistoryDocument::new()));
    }

    let corrupt = |reason: String| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let value: Value = serde_json::from_str(&content).map_err(|err| corrupt(err.to_string()))?;
    HistoryDocument::from_value(value)
        .map(Some)
        .map_err(corrupt)
}

pub fn save_history(path: &Path, document: &HistoryDocument) -> Result<(), StorageError> {
    let value = document.to_value()?;
    let payload = serde_json::to_string_pretty(&value)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    write_atomic(path, payload.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casewatch_core::{Category, Record};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 12, 7, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loaded = load_history(&dir.path().join("absent.json")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn blank_file_loads_as_empty_document() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.json");
        fs::write(&path, "  \n").expect("write blank");

        let loaded = load_history(&path).expect("load").expect("present");
        assert!(loaded.is_empty());
    }

    #[test]
    fn non_object_root_is_corrupt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.json");
        fs::write(&path, "[1, 2, 3]").expect("write array");

        let err = load_history(&path).expect_err("array root must fail");
        assert!(matches!(err, StorageError::Corrupt { .. }));

        fs::write(&path, "{\"P-1\": ").expect("write truncated");
        let err = load_history(&path).expect_err("truncated json must fail");
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn malformed_entries_survive_a_save() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"{
                "P-1": {"process_number": "0001/2025", "markers": "Urgent"},
                "P-2": {"process_id": "P-2", "process_number": "0002/2025", "_metadata": {"first_seen": "2025-05-12T07:30:00Z", "last_seen": "2025-05-12T07:30:00Z"}}
            }"#,
        )
        .expect("write fixture");

        let mut document = load_history(&path).expect("load").expect("present");
        assert_eq!(document.len(), 2);
        assert!(document.get("P-1").is_none());
        assert!(document.get("P-2").is_some());
        assert_eq!(document.malformed_keys().collect::<Vec<_>>(), vec!["P-1"]);

        let record = Record::new("P-3", "0003/2025", Category::Generated);
        document.insert(record.key(), HistoryEntry::first_seen(&record, ts()));
        save_history(&path, &document).expect("save");

        let reloaded = load_history(&path).expect("reload").expect("present");
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.malformed_keys().collect::<Vec<_>>(), vec!["P-1"]);
        assert_eq!(
            reloaded.get("P-3").and_then(|entry| entry.metadata.first_seen),
            Some(ts())
        );
    }

    #[test]
    fn fresh_entry_replaces_malformed_one() {
        let mut document = HistoryDocument::from_value(serde_json::json!({
            "P-1": {"documents": 7}
        }))
        .expect("object root");
        assert_eq!(document.malformed_keys().count(), 1);

        let record = Record::new("P-1", "0001/2025", Category::Received);
        document.insert(record.key(), HistoryEntry::first_seen(&record, ts()));

        assert_eq!(document.malformed_keys().count(), 0);
        assert_eq!(document.len(), 1);
    }

    #[test]
    fn entry_without_metadata_is_not_malformed() {
        let document = HistoryDocument::from_value(serde_json::json!({
            "P1": {"process_id": "P1", "markers": ["A"], "documents": [{"id": "D1"}]},
            "P2": {"process_id": "P2", "_metadata": {"first_seen": "not a date"}}
        }))
        .expect("object root");

        assert_eq!(document.malformed_keys().count(), 0);
        let entry = document.get("P1").expect("P1 parsed");
        assert_eq!(entry.snapshot.markers, vec!["A".to_string()]);
        assert!(entry.metadata.first_seen.is_none());
        assert!(document.get("P2").expect("P2 parsed").metadata.first_seen.is_none());
    }
}
