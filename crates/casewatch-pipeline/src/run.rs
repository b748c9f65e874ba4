use crate::acquire::acquire_artifacts;
use crate::classify::classify;
use crate::delivery::{Notifier, OutgoingMessage, ReportWriter};
use crate::history::merge_history;
use crate::ledger::RunLedger;
use crate::quota::apply_limit;
use crate::report::{baseline_narrative, build_rows, daily_narrative, Narrative};
use crate::source::{CaseSource, SourceError};
use casewatch_core::{Category, Record, RecordKey};
use casewatch_storage::{load_history, save_history, HistoryDocument, StorageError};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub unit: String,
    pub max_new_records: usize,
    pub max_artifact_mb: u64,
    pub history_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub report_path: PathBuf,
    /// Truncates the collection on baseline runs only.
    pub baseline_limit: Option<usize>,
    /// Offset used to turn the run timestamp into the report date shown in
    /// the subject line.
    pub report_offset: FixedOffset,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            unit: "unit".to_string(),
            max_new_records: 10,
            max_artifact_mb: 100,
            history_path: PathBuf::from("data/history.json"),
            artifact_dir: PathBuf::from("artifacts/daily"),
            report_path: PathBuf::from("output/daily_report.json"),
            baseline_limit: None,
            report_offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Baseline,
    Incremental,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Baseline => f.write_str("baseline"),
            RunMode::Incremental => f.write_str("incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub mode: RunMode,
    pub collected: usize,
    pub new: usize,
    pub updated: usize,
    pub selected_new: usize,
    pub deferred: usize,
    pub artifacts: usize,
    pub history_entries: usize,
    pub report_path: PathBuf,
    pub delivered: bool,
}

/// Failures that abort a run. Everything else is recorded per record.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("record collection failed: {0}")]
    Collection(#[from] SourceError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

pub struct DailyRunner {
    config: RunConfig,
}

impl DailyRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Executes one run. The mode is decided once from the stored history.
    ///
    /// History is persisted before the report is written and both are durable
    /// before delivery is attempted; a delivery failure only clears
    /// `RunOutcome::delivered`.
    pub fn run<S, W, N>(
        &self,
        source: &mut S,
        writer: &mut W,
        notifier: &mut N,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError>
    where
        S: CaseSource + ?Sized,
        W: ReportWriter + ?Sized,
        N: Notifier + ?Sized,
    {
        let history = load_history(&self.config.history_path)?
            .filter(|document| !document.is_empty());

        let outcome = match history {
            None => {
                info!(event = "run_mode_selected", mode = %RunMode::Baseline);
                self.run_baseline(source, writer, notifier, now)?
            }
            Some(history) => {
                info!(
                    event = "run_mode_selected",
                    mode = %RunMode::Incremental,
                    history_entries = history.len()
                );
                self.run_incremental(&history, source, writer, notifier, now)?
            }
        };

        info!(
            event = "run_completed",
            mode = %outcome.mode,
            collected = outcome.collected,
            new = outcome.new,
            updated = outcome.updated,
            selected_new = outcome.selected_new,
            deferred = outcome.deferred,
            artifacts = outcome.artifacts,
            history_entries = outcome.history_entries,
            delivered = outcome.delivered
        );
        Ok(outcome)
    }

    fn run_baseline<S, W, N>(
        &self,
        source: &mut S,
        writer: &mut W,
        notifier: &mut N,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError>
    where
        S: CaseSource + ?Sized,
        W: ReportWriter + ?Sized,
        N: Notifier + ?Sized,
    {
        let records = collect_records(source, self.config.baseline_limit)?;

        let mut ledger = RunLedger::default();
        ledger.new_keys = records.iter().map(Record::key).collect();
        let targets: Vec<&Record> = records.iter().collect();
        let acquisition = acquire_artifacts(
            source,
            &targets,
            &self.config.artifact_dir,
            self.config.max_artifact_mb,
        );
        ledger.record_acquisition(&acquisition);

        let history = merge_history(&HistoryDocument::new(), &records, &BTreeSet::new(), now);
        self.persist(&history, &records, &ledger, writer)?;

        let delivered = self.deliver(notifier, baseline_narrative(&self.config.unit, &records));

        Ok(RunOutcome {
            mode: RunMode::Baseline,
            collected: records.len(),
            new: records.len(),
            updated: 0,
            selected_new: records.len(),
            deferred: ledger.deferrals().len(),
            artifacts: ledger.artifacts.len(),
            history_entries: history.len(),
            report_path: self.config.report_path.clone(),
            delivered,
        })
    }

    fn run_incremental<S, W, N>(
        &self,
        previous: &HistoryDocument,
        source: &mut S,
        writer: &mut W,
        notifier: &mut N,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError>
    where
        S: CaseSource + ?Sized,
        W: ReportWriter + ?Sized,
        N: Notifier + ?Sized,
    {
        let records = collect_records(source, None)?;

        let changes = classify(previous, &records);
        info!(
            event = "records_classified",
            new = changes.new.len(),
            updated = changes.updated.len(),
            unchanged = records.len() - changes.new.len() - changes.updated.len()
        );

        let mut ledger = RunLedger::from_changes(&changes);
        let split = apply_limit(changes.new.clone(), self.config.max_new_records);
        if !split.deferred.is_empty() {
            info!(
                event = "quota_applied",
                limit = self.config.max_new_records,
                selected = split.selected.len(),
                deferred = split.deferred.len()
            );
        }
        ledger.record_quota(&split);

        let targets = processing_set(&split.selected, &changes.updated);
        let acquisition = acquire_artifacts(
            source,
            &targets,
            &self.config.artifact_dir,
            self.config.max_artifact_mb,
        );
        ledger.record_acquisition(&acquisition);

        let history = merge_history(previous, &records, &ledger.updated_keys, now);
        self.persist(&history, &records, &ledger, writer)?;

        let narrative = daily_narrative(
            &self.config.unit,
            now.with_timezone(&self.config.report_offset).date_naive(),
            &split.selected,
            &changes.updated,
            &ledger,
        );
        let delivered = self.deliver(notifier, narrative);

        Ok(RunOutcome {
            mode: RunMode::Incremental,
            collected: records.len(),
            new: changes.new.len(),
            updated: changes.updated.len(),
            selected_new: split.selected.len(),
            deferred: ledger.deferrals().len(),
            artifacts: ledger.artifacts.len(),
            history_entries: history.len(),
            report_path: self.config.report_path.clone(),
            delivered,
        })
    }

    fn persist<W>(
        &self,
        history: &HistoryDocument,
        records: &[Record],
        ledger: &RunLedger,
        writer: &mut W,
    ) -> Result<(), RunError>
    where
        W: ReportWriter + ?Sized,
    {
        save_history(&self.config.history_path, history)?;
        info!(
            event = "history_persisted",
            path = %self.config.history_path.display(),
            entries = history.len()
        );

        let rows = build_rows(records, ledger);
        writer.write(&rows, &self.config.report_path)?;
        info!(
            event = "report_written",
            path = %self.config.report_path.display(),
            rows = rows.len()
        );
        Ok(())
    }

    fn deliver<N>(&self, notifier: &mut N, narrative: Narrative) -> bool
    where
        N: Notifier + ?Sized,
    {
        let message = OutgoingMessage {
            subject: narrative.subject,
            body_text: narrative.text,
            body_markup: narrative.markup,
            attachment: Some(self.config.report_path.clone()),
        };

        match notifier.send(&message) {
            Ok(()) => {
                info!(event = "delivery_sent", subject = %message.subject);
                true
            }
            Err(err) => {
                error!(event = "delivery_failed", subject = %message.subject, error = %err);
                false
            }
        }
    }
}

fn collect_records<S>(source: &mut S, limit: Option<usize>) -> Result<Vec<Record>, RunError>
where
    S: CaseSource + ?Sized,
{
    let mut records = source.collect()?;

    let mut per_category: BTreeMap<Category, usize> = BTreeMap::new();
    for record in &records {
        *per_category.entry(record.category).or_default() += 1;
    }
    info!(
        event = "records_collected",
        total = records.len(),
        received = per_category.get(&Category::Received).copied().unwrap_or(0),
        generated = per_category.get(&Category::Generated).copied().unwrap_or(0)
    );

    if let Some(limit) = limit {
        if records.len() > limit {
            info!(event = "records_truncated", limit, dropped = records.len() - limit);
            records.truncate(limit);
        }
    }

    Ok(source.enrich(records)?)
}

/// Quota-selected new records followed by every updated record, once per key.
fn processing_set<'a>(selected: &[&'a Record], updated: &[&'a Record]) -> Vec<&'a Record> {
    let mut seen: BTreeSet<RecordKey> = BTreeSet::new();
    selected
        .iter()
        .chain(updated.iter())
        .copied()
        .filter(|record| seen.insert(record.key()))
        .collect()
}
