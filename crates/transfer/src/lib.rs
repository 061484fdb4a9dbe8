//! File transfer from the client's content-delivery origin.
//!
//! The [`Downloader`] trait is the seam the repair manager drives;
//! [`HttpDownloader`] is the production implementation.

mod download;
mod throttle;
mod validation;

pub use download::{Downloader, HttpDownloader, TransferProgress, join_url};
pub use throttle::{DEFAULT_THROTTLE_INTERVAL, ProgressThrottle, crossed_step};
pub use validation::validate_relative_path;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("download cancelled")]
    Cancelled,

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
