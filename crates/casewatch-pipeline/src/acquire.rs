use crate::quota::{megabytes_to_bytes, DeferralReason, Deferred};
use crate::source::CaseSource;
use casewatch_core::Record;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct AttachedArtifact<'a> {
    pub record: &'a Record,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AcquisitionOutcome<'a> {
    pub attached: Vec<AttachedArtifact<'a>>,
    pub deferred: Vec<Deferred<'a>>,
}

/// Requests one artifact per target, in order. A failure only defers that
/// record; oversize files stay on disk but are not reported as attached.
pub fn acquire_artifacts<'a, S>(
    source: &mut S,
    targets: &[&'a Record],
    destination_dir: &Path,
    max_artifact_mb: u64,
) -> AcquisitionOutcome<'a>
where
    S: CaseSource + ?Sized,
{
    let mut outcome = AcquisitionOutcome::default();
    if let Err(err) = fs::create_dir_all(destination_dir) {
        warn!(
            event = "artifact_dir_unavailable",
            path = %destination_dir.display(),
            error = %err
        );
    }

    for &record in targets {
        let key = record.key();
        match acquire_one(source, record, destination_dir, max_artifact_mb) {
            Ok((path, size_bytes)) => {
                info!(
                    event = "artifact_stored",
                    key = %key,
                    path = %path.display(),
                    size_kb = size_bytes / 1024
                );
                outcome.attached.push(AttachedArtifact {
                    record,
                    path,
                    size_bytes,
                });
            }
            Err(reason) => {
                warn!(event = "artifact_deferred", key = %key, reason = %reason);
                outcome.deferred.push(Deferred { record, reason });
            }
        }
    }

    outcome
}

fn acquire_one<S>(
    source: &mut S,
    record: &Record,
    destination_dir: &Path,
    max_artifact_mb: u64,
) -> Result<(PathBuf, u64), DeferralReason>
where
    S: CaseSource + ?Sized,
{
    let fetch = source
        .fetch_artifact(record, destination_dir)
        .map_err(|err| DeferralReason::AcquisitionFailed(err.to_string()))?;

    let path = match fetch.path {
        Some(path) if fetch.success => path,
        _ => {
            let message = fetch
                .error
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "artifact acquisition failed without detail".to_string());
            return Err(DeferralReason::AcquisitionFailed(message));
        }
    };

    let size_bytes = fs::metadata(&path)
        .map_err(|err| {
            DeferralReason::AcquisitionFailed(format!(
                "artifact unreadable at {}: {err}",
                path.display()
            ))
        })?
        .len();

    if size_bytes > megabytes_to_bytes(max_artifact_mb) {
        return Err(DeferralReason::ArtifactTooLarge {
            limit_mb: max_artifact_mb,
            actual_bytes: size_bytes,
        });
    }

    Ok((path, size_bytes))
}
