use casewatch_core::Record;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by the portal collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result of one artifact request, as reported by the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactFetch {
    pub success: bool,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl ArtifactFetch {
    pub fn stored(path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            path: Some(path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: None,
            error: Some(error.into()),
        }
    }
}

/// The portal session: yields records and per-record artifact downloads.
///
/// Ordering returned by `collect` is preserved by every downstream stage.
pub trait CaseSource {
    fn collect(&mut self) -> Result<Vec<Record>, SourceError>;

    /// Populates document lists. Sources that already return them may pass through.
    fn enrich(&mut self, records: Vec<Record>) -> Result<Vec<Record>, SourceError> {
        Ok(records)
    }

    fn fetch_artifact(
        &mut self,
        record: &Record,
        destination_dir: &Path,
    ) -> Result<ArtifactFetch, SourceError>;
}
