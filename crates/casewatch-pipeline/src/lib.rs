//! Incremental change detection and bounded reporting over portal records.
//!
//! A run loads the stored history, classifies what the portal shows now,
//! enforces the new-record quota, fetches artifacts for the processing set,
//! persists the merged history, writes the tabular report and finally hands a
//! narrative to the notifier.

mod acquire;
mod classify;
mod delivery;
mod history;
mod ledger;
mod quota;
mod report;
mod run;
mod source;

pub use acquire::{acquire_artifacts, AcquisitionOutcome, AttachedArtifact};
pub use classify::{classify, detect_changes, ChangeSet, ChangeSignal};
pub use delivery::{DeliveryError, JsonReportWriter, Notifier, OutgoingMessage, ReportWriter};
pub use history::merge_history;
pub use ledger::RunLedger;
pub use quota::{apply_limit, megabytes_to_bytes, DeferralReason, Deferred, QuotaSplit};
pub use report::{
    baseline_narrative, build_rows, daily_narrative, daily_subject, escape_markup, Narrative,
    ReportRow, DEFERRED_DISPLAY_CAP, REPORT_COLUMNS, SUBJECT_TAG,
};
pub use run::{DailyRunner, RunConfig, RunError, RunMode, RunOutcome};
pub use source::{ArtifactFetch, CaseSource, SourceError};
