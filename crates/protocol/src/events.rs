use serde::{Deserialize, Serialize};

use crate::progress::PatchProgress;

/// A new game session was detected in the client log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedEvent {
    pub game_id: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub timestamp: i64,
}

/// The patcher reported the web root it is fetching from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRootFoundEvent {
    pub game_id: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub web_root: String,
    pub timestamp: i64,
}

/// The patcher reported its fallback (mirror) web root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupWebRootFoundEvent {
    pub game_id: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub backup_web_root: String,
    pub timestamp: i64,
}

/// The partial-transfer error count crossed the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorThresholdEvent {
    pub game_id: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub error_count: u32,
    pub log_path: String,
}

/// Envelope for everything the engine publishes.
///
/// Serialized as `{"type": "...", "payload": {...}}` so consumers can
/// dispatch on the tag without knowing every payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum EngineEvent {
    SessionStarted(SessionStartedEvent),
    WebRootFound(WebRootFoundEvent),
    BackupWebRootFound(BackupWebRootFoundEvent),
    ErrorThresholdReached(ErrorThresholdEvent),
    PatchProgress(PatchProgress),
}

impl EngineEvent {
    /// Short name of the event kind, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "sessionStarted",
            Self::WebRootFound(_) => "webRootFound",
            Self::BackupWebRootFound(_) => "backupWebRootFound",
            Self::ErrorThresholdReached(_) => "errorThresholdReached",
            Self::PatchProgress(_) => "patchProgress",
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
