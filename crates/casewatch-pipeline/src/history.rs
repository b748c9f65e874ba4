use casewatch_core::{HistoryEntry, HistoryMetadata, Record, RecordKey};
use casewatch_storage::HistoryDocument;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::warn;

/// Folds this run's observations into a copy of `previous`.
///
/// Entries for keys not observed this run are carried unchanged. Malformed
/// entries stay in the side table unless a current record reclaims the key.
pub fn merge_history(
    previous: &HistoryDocument,
    current: &[Record],
    updated: &BTreeSet<RecordKey>,
    run_ts: DateTime<Utc>,
) -> HistoryDocument {
    let mut merged = previous.clone();

    for record in current {
        let key = record.key();
        if key.is_blank() {
            warn!(
                event = "history_record_skipped",
                process_number = %record.process_number,
                reason = "blank record key"
            );
            continue;
        }

        let metadata = match merged.get(key.as_str()) {
            Some(existing) => {
                let prior = &existing.metadata;
                let first_seen = prior.first_seen.unwrap_or(run_ts);
                let last_updated = if updated.contains(&key) {
                    run_ts
                } else {
                    prior.last_updated.unwrap_or(first_seen)
                };
                HistoryMetadata {
                    first_seen: Some(first_seen),
                    last_seen: Some(run_ts),
                    last_updated: Some(last_updated),
                    extra: prior.extra.clone(),
                }
            }
            None => HistoryMetadata::first_seen_at(run_ts),
        };

        merged.insert(
            key,
            HistoryEntry {
                snapshot: record.clone(),
                metadata,
            },
        );
    }

    merged
}
