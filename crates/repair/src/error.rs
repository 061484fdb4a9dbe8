//! Repair error types.

use std::path::PathBuf;

/// Errors that end a repair flow, or a single file within one.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("a repair is already in progress")]
    AlreadyRunning,

    #[error("unknown service profile: {0}")]
    UnknownService(String),

    #[error("log file not found: {}", .0.display())]
    LogFileMissing(PathBuf),

    #[error("no web root found in the client log")]
    NoWebRoot,

    #[error("no local backup in {}", .0.display())]
    NoBackup(PathBuf),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transfer(#[from] patchdoc_transfer::TransferError),

    #[error(transparent)]
    FileOps(#[from] patchdoc_file_ops::FileOpsError),
}

impl PatchError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transfer(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
