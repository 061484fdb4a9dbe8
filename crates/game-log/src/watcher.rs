//! Session-scoped log watcher.
//!
//! Polls the client log once per interval, reads only bytes appended since
//! the previous poll, and publishes typed events on the shared bus.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use patchdoc_event_bus::EventBus;
use patchdoc_protocol::{
    BackupWebRootFoundEvent, EngineEvent, ErrorThresholdEvent, ProfileRegistry,
    ServiceProfile, SessionStartedEvent, WebRootFoundEvent, now_millis,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::extract::{LogLine, classify_line, extract_pid};
use crate::window::session_start_offset;

/// Default interval between log polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Partial-transfer lines per session before the threshold event fires.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 10;

/// Resolves a game's install directory from its service and game ids.
pub trait PathResolver: Send + Sync {
    fn resolve_install_path(&self, service_id: &str, game_id: &str) -> Option<PathBuf>;
}

/// Location of the client log for an install directory.
pub fn log_path(install_path: &Path, profile: &ServiceProfile) -> PathBuf {
    install_path.join("logs").join(&profile.log_file_name)
}

/// Watcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub error_threshold: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

/// Read position and counters for one monitored session.
#[derive(Debug, Clone)]
pub struct LogReadState {
    pub log_path: PathBuf,
    pub byte_offset: u64,
    pub session_error_count: u32,
    pub last_reported_error_count: u32,
    pub pid: Option<u32>,
    pub service_id: String,
    pub game_id: String,
}

impl LogReadState {
    pub fn new(
        log_path: PathBuf,
        byte_offset: u64,
        service_id: impl Into<String>,
        game_id: impl Into<String>,
        pid: Option<u32>,
    ) -> Self {
        Self {
            log_path,
            byte_offset,
            session_error_count: 0,
            last_reported_error_count: 0,
            pid,
            service_id: service_id.into(),
            game_id: game_id.into(),
        }
    }

    /// Reads everything appended since the last poll and returns the events it produced.
    ///
    /// Only complete lines are consumed; a trailing partial line is left
    /// for the next poll. A file smaller than the tracked offset is treated
    /// as rotated and re-read from the start.
    pub fn poll(
        &mut self,
        profile: &ServiceProfile,
        error_threshold: u32,
    ) -> std::io::Result<Vec<EngineEvent>> {
        let mut events = Vec::new();
        let mut file = std::fs::File::open(&self.log_path)?;
        let size = file.metadata()?.len();

        if size < self.byte_offset {
            tracing::debug!(
                path = %self.log_path.display(),
                size,
                offset = self.byte_offset,
                "log file shrank, reading from start"
            );
            self.byte_offset = 0;
            self.reset_counters();
        }
        if size == self.byte_offset {
            return Ok(events);
        }

        file.seek(SeekFrom::Start(self.byte_offset))?;
        let mut buf = Vec::with_capacity((size - self.byte_offset) as usize);
        file.take(size - self.byte_offset).read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(events);
        };
        self.byte_offset += last_newline as u64 + 1;

        let text = String::from_utf8_lossy(&buf[..last_newline]);
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.handle_line(line, profile, &mut events);
            }
        }

        if self.session_error_count >= error_threshold
            && self.session_error_count != self.last_reported_error_count
        {
            self.last_reported_error_count = self.session_error_count;
            tracing::warn!(
                service = %self.service_id,
                game = %self.game_id,
                count = self.session_error_count,
                "partial transfer threshold reached"
            );
            events.push(EngineEvent::ErrorThresholdReached(ErrorThresholdEvent {
                game_id: self.game_id.clone(),
                service_id: self.service_id.clone(),
                pid: self.pid,
                error_count: self.session_error_count,
                log_path: self.log_path.display().to_string(),
            }));
        }

        Ok(events)
    }

    fn handle_line(&mut self, line: &str, profile: &ServiceProfile, events: &mut Vec<EngineEvent>) {
        let kind = classify_line(line, profile);

        if kind == LogLine::SessionMarker {
            self.reset_counters();
            if self.pid.is_some() {
                events.push(EngineEvent::SessionStarted(SessionStartedEvent {
                    game_id: self.game_id.clone(),
                    service_id: self.service_id.clone(),
                    pid: self.pid,
                    timestamp: now_millis(),
                }));
            }
            return;
        }

        if let Some(pid) = self.pid {
            if extract_pid(line) != Some(pid) {
                return;
            }
        }

        match kind {
            LogLine::WebRoot(web_root) => {
                tracing::debug!(service = %self.service_id, %web_root, "web root found");
                events.push(EngineEvent::WebRootFound(WebRootFoundEvent {
                    game_id: self.game_id.clone(),
                    service_id: self.service_id.clone(),
                    pid: self.pid,
                    web_root,
                    timestamp: now_millis(),
                }));
            }
            LogLine::BackupWebRoot(backup_web_root) => {
                tracing::debug!(service = %self.service_id, %backup_web_root, "backup web root found");
                events.push(EngineEvent::BackupWebRootFound(BackupWebRootFoundEvent {
                    game_id: self.game_id.clone(),
                    service_id: self.service_id.clone(),
                    pid: self.pid,
                    backup_web_root,
                    timestamp: now_millis(),
                }));
            }
            LogLine::PartialFileError => {
                self.session_error_count += 1;
                tracing::info!(
                    service = %self.service_id,
                    game = %self.game_id,
                    count = self.session_error_count,
                    "partial file transfer logged"
                );
            }
            LogLine::QueuedFile(_) | LogLine::SessionMarker | LogLine::Unrecognized => {}
        }
    }

    fn reset_counters(&mut self) {
        self.session_error_count = 0;
        self.last_reported_error_count = 0;
    }
}

type SessionKey = (String, String);

struct Session {
    cancel: CancellationToken,
    state: Arc<std::sync::Mutex<LogReadState>>,
    profile: ServiceProfile,
}

struct WatcherState {
    sessions: HashMap<SessionKey, Session>,
}

/// Watches client logs, one polling task per `(service, game)` session.
pub struct LogWatcher {
    inner: Arc<Mutex<WatcherState>>,
    resolver: Arc<dyn PathResolver>,
    profiles: ProfileRegistry,
    bus: EventBus<EngineEvent>,
    config: WatcherConfig,
}

impl LogWatcher {
    pub fn new(
        resolver: Arc<dyn PathResolver>,
        profiles: ProfileRegistry,
        bus: EventBus<EngineEvent>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WatcherState {
                sessions: HashMap::new(),
            })),
            resolver,
            profiles,
            bus,
            config,
        }
    }

    /// Starts monitoring the log of `(service_id, game_id)`.
    ///
    /// Lines written before the most recent session marker are skipped.
    /// An existing session for the same pair is replaced. Returns the log path.
    pub async fn start_monitoring(
        &self,
        service_id: &str,
        game_id: &str,
        pid: Option<u32>,
    ) -> Result<PathBuf, WatchError> {
        let profile = self
            .profiles
            .get(service_id)
            .cloned()
            .ok_or_else(|| WatchError::UnknownService(service_id.to_string()))?;
        let install_path = self
            .resolver
            .resolve_install_path(service_id, game_id)
            .ok_or_else(|| WatchError::InstallPathNotFound {
                service_id: service_id.to_string(),
                game_id: game_id.to_string(),
            })?;

        let path = log_path(&install_path, &profile);
        if !path.is_file() {
            return Err(WatchError::LogFileMissing(path));
        }
        let offset = session_start_offset(&path)?;

        let state = Arc::new(std::sync::Mutex::new(LogReadState::new(
            path.clone(),
            offset,
            service_id,
            game_id,
            pid,
        )));
        let cancel = CancellationToken::new();
        let key = (service_id.to_string(), game_id.to_string());

        {
            let mut watcher = self.inner.lock().await;
            if let Some(previous) = watcher.sessions.remove(&key) {
                previous.cancel.cancel();
                tracing::debug!(service = service_id, game = game_id, "replaced previous session");
            }
            watcher.sessions.insert(
                key.clone(),
                Session {
                    cancel: cancel.clone(),
                    state: Arc::clone(&state),
                    profile: profile.clone(),
                },
            );
        }

        tokio::spawn(poll_session(
            key,
            state,
            profile,
            self.config,
            self.bus.clone(),
            cancel,
            Arc::clone(&self.inner),
        ));

        tracing::info!(
            service = service_id,
            game = game_id,
            ?pid,
            path = %path.display(),
            offset,
            "started log monitoring"
        );
        Ok(path)
    }

    /// Stops monitoring after one last poll so lines written right before
    /// the client exited are not lost. Returns whether a session existed.
    pub async fn stop_monitoring(&self, service_id: &str, game_id: &str) -> bool {
        let key = (service_id.to_string(), game_id.to_string());
        let Some(session) = self.inner.lock().await.sessions.remove(&key) else {
            return false;
        };
        session.cancel.cancel();
        self.final_poll(&session);
        tracing::info!(service = service_id, game = game_id, "stopped log monitoring");
        true
    }

    /// Stops every active session.
    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.inner.lock().await.sessions.drain().collect();
        for ((service, game), session) in sessions {
            session.cancel.cancel();
            self.final_poll(&session);
            tracing::debug!(%service, %game, "stopped log monitoring");
        }
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_monitoring(&self, service_id: &str, game_id: &str) -> bool {
        let key = (service_id.to_string(), game_id.to_string());
        self.inner.lock().await.sessions.contains_key(&key)
    }

    /// Snapshot of a session's read state.
    pub async fn read_state(&self, service_id: &str, game_id: &str) -> Option<LogReadState> {
        let key = (service_id.to_string(), game_id.to_string());
        let watcher = self.inner.lock().await;
        let session = watcher.sessions.get(&key)?;
        let state = session.state.lock().unwrap_or_else(|p| p.into_inner());
        Some(state.clone())
    }

    fn final_poll(&self, session: &Session) {
        let mut state = session.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.poll(&session.profile, self.config.error_threshold) {
            Ok(events) => events.into_iter().for_each(|e| self.bus.publish(e)),
            Err(e) => tracing::warn!(path = %state.log_path.display(), error = %e, "final log poll failed"),
        }
    }
}

/// Polling loop for one session. Exits on cancellation or on the first I/O error.
async fn poll_session(
    key: SessionKey,
    state: Arc<std::sync::Mutex<LogReadState>>,
    profile: ServiceProfile,
    config: WatcherConfig,
    bus: EventBus<EngineEvent>,
    cancel: CancellationToken,
    inner: Arc<Mutex<WatcherState>>,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let result = {
                    let mut s = state.lock().unwrap_or_else(|p| p.into_inner());
                    s.poll(&profile, config.error_threshold)
                };
                match result {
                    Ok(events) => events.into_iter().for_each(|e| bus.publish(e)),
                    Err(e) => {
                        tracing::warn!(
                            service = %key.0,
                            game = %key.1,
                            error = %e,
                            "log poll failed, monitoring stopped"
                        );
                        break;
                    }
                }
            }
        }
    }

    // Remove ourselves unless a newer session already replaced this one.
    let mut watcher = inner.lock().await;
    if watcher
        .sessions
        .get(&key)
        .is_some_and(|s| Arc::ptr_eq(&s.state, &state))
    {
        watcher.sessions.remove(&key);
    }
}
