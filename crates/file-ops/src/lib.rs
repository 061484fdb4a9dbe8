//! Install directory layout for repair runs.
//!
//! A run owns two directories next to the game files: a scratch directory
//! that downloads land in, and a backup directory holding the pre-repair
//! copies of every overwritten file plus `backup-info.json`.

mod backup;
mod layout;

pub use backup::{
    backup_file, list_backup_files, prepare_backup_dir, read_backup_info, restore_file,
    write_backup_info,
};
pub use layout::{
    BACKUP_DIR_NAME, TEMP_DIR_NAME, backup_dir, ensure_temp_dir, expand_home, install_file,
    remove_temp_dir, temp_dir,
};

/// Errors produced by install-directory operations.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid backup metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no backup found in {0}")]
    NoBackup(std::path::PathBuf),
}

impl FileOpsError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
