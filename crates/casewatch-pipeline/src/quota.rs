use casewatch_core::Record;
use std::fmt;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Why a record was kept out of full processing this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferralReason {
    QuotaExceeded,
    ArtifactTooLarge { limit_mb: u64, actual_bytes: u64 },
    AcquisitionFailed(String),
}

impl fmt::Display for DeferralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferralReason::QuotaExceeded => f.write_str("new-record quota exceeded"),
            DeferralReason::ArtifactTooLarge {
                limit_mb,
                actual_bytes,
            } => write!(
                f,
                "artifact exceeds {limit_mb}MB ({:.2}MB)",
                *actual_bytes as f64 / BYTES_PER_MB as f64
            ),
            DeferralReason::AcquisitionFailed(message) => f.write_str(message),
        }
    }
}

pub fn megabytes_to_bytes(megabytes: u64) -> u64 {
    megabytes.saturating_mul(BYTES_PER_MB)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deferred<'a> {
    pub record: &'a Record,
    pub reason: DeferralReason,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct QuotaSplit<'a> {
    pub selected: Vec<&'a Record>,
    pub deferred: Vec<Deferred<'a>>,
}

/// Keeps the first `max_new` records in collection order; the rest are
/// deferred. A prefix, so identical input always selects identical records.
pub fn apply_limit<'a>(new_records: Vec<&'a Record>, max_new: usize) -> QuotaSplit<'a> {
    if new_records.len() <= max_new {
        return QuotaSplit {
            selected: new_records,
            deferred: Vec::new(),
        };
    }

    let mut selected = new_records;
    let overflow = selected.split_off(max_new);
    QuotaSplit {
        selected,
        deferred: overflow
            .into_iter()
            .map(|record| Deferred {
                record,
                reason: DeferralReason::QuotaExceeded,
            })
            .collect(),
    }
}
