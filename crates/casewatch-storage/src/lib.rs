use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod history;
mod report_file;

pub use history::{load_history, save_history, HistoryDocument};
pub use report_file::{load_report, write_report, StoredReport};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("corrupt document at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Replaces `path` with `payload` through a sibling temp file and a rename, so
/// readers only ever see the previous or the complete new document.
pub fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    fs::write(&temp_path, payload).map_err(|err| StorageError::io(&temp_path, err))?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::io(path, err));
    }
    Ok(())
}
