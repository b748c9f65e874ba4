use casewatch_core::{Record, RecordKey};
use casewatch_storage::HistoryDocument;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    NewDocuments(usize),
    MarkersChanged,
    SignersChanged,
}

/// New and updated records, each in collection order. Unchanged records are
/// in neither list.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet<'a> {
    pub new: Vec<&'a Record>,
    pub updated: Vec<&'a Record>,
}

impl<'a> ChangeSet<'a> {
    pub fn new_keys(&self) -> BTreeSet<RecordKey> {
        self.new.iter().map(|record| record.key()).collect()
    }

    pub fn updated_keys(&self) -> BTreeSet<RecordKey> {
        self.updated.iter().map(|record| record.key()).collect()
    }
}

/// Compares what the portal shows now with the last stored snapshot.
///
/// Only document ids, non-blank markers and signers count. The unread flags
/// (`has_unseen_documents`, `has_annotations`, per-document `is_new`) flip when
/// somebody merely opens a record and are never consulted here.
pub fn detect_changes(previous: &Record, current: &Record) -> Vec<ChangeSignal> {
    let mut signals = Vec::new();

    let known_documents = previous.document_ids();
    let appeared = current
        .document_ids()
        .into_iter()
        .filter(|id| !known_documents.contains(id))
        .count();
    if appeared > 0 {
        signals.push(ChangeSignal::NewDocuments(appeared));
    }

    if previous.marker_set() != current.marker_set() {
        signals.push(ChangeSignal::MarkersChanged);
    }

    if previous.signer_set() != current.signer_set() {
        signals.push(ChangeSignal::SignersChanged);
    }

    signals
}

pub fn classify<'a>(history: &HistoryDocument, current: &'a [Record]) -> ChangeSet<'a> {
    let mut changes = ChangeSet::default();

    for record in current {
        let key = record.key();
        let Some(entry) = history.get(key.as_str()) else {
            changes.new.push(record);
            continue;
        };

        let signals = detect_changes(&entry.snapshot, record);
        if !signals.is_empty() {
            debug!(event = "record_updated", key = %key, signals = ?signals);
            changes.updated.push(record);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use casewatch_core::{Category, HistoryEntry, SubRecord};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 14, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn document(id: &str, is_new: bool) -> SubRecord {
        SubRecord {
            id: Some(id.to_string()),
            title: format!("Document {id}"),
            is_new,
            ..SubRecord::default()
        }
    }

    fn record(id: &str, markers: &[&str], documents: &[&str]) -> Record {
        let mut record = Record::new(id, format!("{id}/2025"), Category::Received);
        record.markers = markers.iter().map(|marker| marker.to_string()).collect();
        record.documents = documents.iter().map(|doc| document(doc, false)).collect();
        record
    }

    fn history_of(records: &[Record]) -> HistoryDocument {
        let mut history = HistoryDocument::new();
        for record in records {
            history.insert(record.key(), HistoryEntry::first_seen(record, ts()));
        }
        history
    }

    #[test]
    fn empty_history_makes_everything_new() {
        let current = vec![record("P1", &[], &[]), record("P2", &["A"], &["D1"])];
        let changes = classify(&HistoryDocument::new(), &current);

        assert_eq!(changes.new, vec![&current[0], &current[1]]);
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn identical_record_is_unchanged() {
        let history = history_of(&[record("P1", &["A"], &["D1"])]);
        let current = vec![record("P1", &["A"], &["D1"])];

        let changes = classify(&history, &current);
        assert!(changes.new.is_empty());
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn marker_change_marks_updated() {
        let history = history_of(&[record("P1", &["A"], &["D1"])]);
        let current = vec![record("P1", &["B"], &["D1"])];

        let changes = classify(&history, &current);
        assert!(changes.new.is_empty());
        assert_eq!(changes.updated_keys(), BTreeSet::from([RecordKey::from("P1")]));
    }

    #[test]
    fn blank_markers_are_ignored_on_both_sides() {
        let history = history_of(&[record("P1", &["A", ""], &[])]);
        let current = vec![record("P1", &["  ", "A", " A "], &[])];

        let changes = classify(&history, &current);
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn new_document_id_marks_updated_but_removed_one_does_not() {
        let history = history_of(&[
            record("P1", &[], &["D1"]),
            record("P2", &[], &["D1", "D2"]),
        ]);
        let current = vec![
            record("P1", &[], &["D1", "D2"]),
            record("P2", &[], &["D1"]),
        ];

        let changes = classify(&history, &current);
        assert_eq!(changes.updated, vec![&current[0]]);
        assert_eq!(
            detect_changes(&history.get("P1").expect("entry").snapshot, &current[0]),
            vec![ChangeSignal::NewDocuments(1)]
        );
    }

    #[test]
    fn documents_without_id_never_count() {
        let history = history_of(&[record("P1", &[], &["D1"])]);
        let mut current = record("P1", &[], &["D1"]);
        current.documents.push(SubRecord {
            id: None,
            title: "legacy attachment".to_string(),
            ..SubRecord::default()
        });

        let changes = classify(&history, std::slice::from_ref(&current));
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn signer_change_marks_updated() {
        let mut before = record("P1", &[], &[]);
        before.signers = vec!["Ana".to_string()];
        let history = history_of(&[before]);

        let mut after = record("P1", &[], &[]);
        after.signers = vec!["Ana".to_string(), "Bruno".to_string()];

        let changes = classify(&history, std::slice::from_ref(&after));
        assert_eq!(changes.updated.len(), 1);
    }

    #[test]
    fn unread_flags_never_mark_updated() {
        let history = history_of(&[record("P1", &["A"], &["D1"])]);

        let mut current = record("P1", &["A"], &[]);
        current.documents = vec![document("D1", true)];
        current.has_unseen_documents = true;
        current.has_annotations = true;
        current.viewed = false;

        let changes = classify(&history, std::slice::from_ref(&current));
        assert!(changes.new.is_empty());
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn key_fallback_matches_history_keyed_by_number() {
        let mut stored = Record::default();
        stored.process_number = "0042/2025".to_string();
        let history = history_of(&[stored]);

        let mut current = Record::default();
        current.process_id = Some(String::new());
        current.process_number = "0042/2025".to_string();

        let changes = classify(&history, std::slice::from_ref(&current));
        assert!(changes.new.is_empty());
    }

    #[test]
    fn output_preserves_collection_order() {
        let history = history_of(&[record("P2", &["A"], &[]), record("P4", &["A"], &[])]);
        let current = vec![
            record("P5", &[], &[]),
            record("P4", &["B"], &[]),
            record("P1", &[], &[]),
            record("P2", &["C"], &[]),
            record("P3", &[], &[]),
        ];

        let changes = classify(&history, &current);
        let new_ids: Vec<_> = changes.new.iter().map(|r| r.key()).collect();
        let updated_ids: Vec<_> = changes.updated.iter().map(|r| r.key()).collect();
        assert_eq!(
            new_ids,
            vec![RecordKey::from("P5"), RecordKey::from("P1"), RecordKey::from("P3")]
        );
        assert_eq!(updated_ids, vec![RecordKey::from("P4"), RecordKey::from("P2")]);
    }

    #[test]
    fn history_entry_without_metadata_still_classifies_by_snapshot() {
        let history = HistoryDocument::from_value(serde_json::json!({
            "P1": {"process_id": "P1", "markers": ["A"], "documents": [{"id": "D1"}]}
        }))
        .expect("object root");
        assert_eq!(history.malformed_keys().count(), 0);

        let unchanged = vec![record("P1", &["A"], &["D1"])];
        let changes = classify(&history, &unchanged);
        assert!(changes.new.is_empty());
        assert!(changes.updated.is_empty());

        let remarked = vec![record("P1", &["B"], &["D1"])];
        let changes = classify(&history, &remarked);
        assert!(changes.new.is_empty());
        assert_eq!(changes.updated.len(), 1);
    }
}
