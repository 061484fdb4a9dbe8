use std::path::PathBuf;

/// Errors that prevent a monitoring session from starting.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("unknown service profile: {0}")]
    UnknownService(String),

    #[error("no install path for service {service_id} / game {game_id}")]
    InstallPathNotFound { service_id: String, game_id: String },

    #[error("log file not found: {}", .0.display())]
    LogFileMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
