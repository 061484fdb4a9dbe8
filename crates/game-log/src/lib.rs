//! Client log parsing: line extraction, live session tailing and one-shot
//! analysis for repair planning.
//!
//! The client appends every session to the same text log. [`LogWatcher`]
//! follows the current session and turns interesting lines into
//! [`EngineEvent`](patchdoc_protocol::EngineEvent)s; [`analyze_log`] reads
//! the same session once to recover what the patcher was doing.

mod analyze;
mod error;
pub mod extract;
mod watcher;
mod window;

pub use analyze::{ParsedLogInfo, analyze_log, analyze_window};
pub use error::WatchError;
pub use extract::{
    LogLine, PARTIAL_FILE_ERROR, SESSION_MARKER, UNKNOWN_VERSION, classify_line,
    extract_version, find_last_marker_offset,
};
pub use watcher::{
    DEFAULT_ERROR_THRESHOLD, DEFAULT_POLL_INTERVAL, LogReadState, LogWatcher, PathResolver,
    WatcherConfig, log_path,
};
pub use window::{TAIL_WINDOW_BYTES, read_tail, session_start_offset};
