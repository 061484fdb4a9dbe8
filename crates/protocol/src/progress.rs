use serde::{Deserialize, Serialize};

/// State of a single file in a repair plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Waiting,
    Downloading,
    Done,
    Error,
}

/// State of a whole repair run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStatus {
    #[default]
    Waiting,
    Downloading,
    Done,
    Error,
}

/// Progress of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub file_name: String,
    pub status: FileStatus,
    /// 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileProgress {
    /// A file that has not been touched yet.
    pub fn waiting(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            status: FileStatus::Waiting,
            progress: 0,
            error: None,
        }
    }
}

/// Snapshot of a repair run, recomputed every time it is published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProgress {
    pub status: PatchStatus,
    pub total: usize,
    pub current: usize,
    /// `floor(current / total * 100)`, 0 when `total` is 0.
    pub overall_progress: u8,
    pub files: Vec<FileProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatchProgress {
    /// Builds a snapshot, deriving `overall_progress` from the counts.
    pub fn new(status: PatchStatus, current: usize, files: Vec<FileProgress>) -> Self {
        let total = files.len();
        let current = current.min(total);
        Self {
            status,
            total,
            current,
            overall_progress: overall_percent(current, total),
            files,
            error: None,
        }
    }

    /// Attaches an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn overall_percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((current * 100) / total).min(100) as u8
}
