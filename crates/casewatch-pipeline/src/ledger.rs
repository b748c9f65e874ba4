use crate::acquire::AcquisitionOutcome;
use crate::classify::ChangeSet;
use crate::quota::{DeferralReason, QuotaSplit};
use casewatch_core::RecordKey;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Per-key outcome of one run, shared by the tabular report, the narrative
/// and the history merge so all three agree on identity.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunLedger {
    pub new_keys: BTreeSet<RecordKey>,
    pub updated_keys: BTreeSet<RecordKey>,
    pub quota_deferred: BTreeSet<RecordKey>,
    pub artifacts: BTreeMap<RecordKey, PathBuf>,
    deferrals: Vec<(RecordKey, DeferralReason)>,
}

impl RunLedger {
    pub fn from_changes(changes: &ChangeSet<'_>) -> Self {
        Self {
            new_keys: changes.new_keys(),
            updated_keys: changes.updated_keys(),
            ..Self::default()
        }
    }

    pub fn record_quota(&mut self, split: &QuotaSplit<'_>) {
        for deferred in &split.deferred {
            let key = deferred.record.key();
            self.quota_deferred.insert(key.clone());
            self.defer(key, deferred.reason.clone());
        }
    }

    pub fn record_acquisition(&mut self, outcome: &AcquisitionOutcome<'_>) {
        for attached in &outcome.attached {
            self.artifacts
                .insert(attached.record.key(), attached.path.clone());
        }
        for deferred in &outcome.deferred {
            self.defer(deferred.record.key(), deferred.reason.clone());
        }
    }

    /// Keeps first-deferral order; a later reason for the same key replaces
    /// the earlier one in place.
    pub fn defer(&mut self, key: RecordKey, reason: DeferralReason) {
        self.artifacts.remove(&key);
        match self.deferrals.iter_mut().find(|(known, _)| *known == key) {
            Some(slot) => slot.1 = reason,
            None => self.deferrals.push((key, reason)),
        }
    }

    pub fn deferrals(&self) -> &[(RecordKey, DeferralReason)] {
        &self.deferrals
    }

    pub fn reason_for(&self, key: &str) -> Option<&DeferralReason> {
        self.deferrals
            .iter()
            .find(|(known, _)| known.as_str() == key)
            .map(|(_, reason)| reason)
    }

    pub fn artifact_for(&self, key: &str) -> Option<&Path> {
        self.artifacts.get(key).map(PathBuf::as_path)
    }
}
