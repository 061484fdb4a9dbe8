//! Shared data types for the patchdoc repair engine.
//!
//! Everything here is plain serde data: events published by the log
//! watcher and the repair manager, progress snapshots, the persisted
//! backup metadata, and per-service profiles. No I/O lives in this crate.

pub mod backup;
pub mod events;
pub mod profile;
pub mod progress;

pub use backup::{BACKUP_INFO_FILE, BackupInfo};
pub use events::{
    BackupWebRootFoundEvent, EngineEvent, ErrorThresholdEvent, SessionStartedEvent,
    WebRootFoundEvent, now_millis,
};
pub use profile::{ProfileRegistry, ServiceProfile};
pub use progress::{FileProgress, FileStatus, PatchProgress, PatchStatus};
