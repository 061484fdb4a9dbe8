//! Single-flight repair manager.
//!
//! Each flow claims the manager with a busy flag released on drop, so a
//! second request is rejected instead of queued and the flag is cleared
//! on every exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{FuturesUnordered, StreamExt};
use patchdoc_event_bus::EventBus;
use patchdoc_file_ops::{self as file_ops, FileOpsError};
use patchdoc_game_log::{analyze_log, extract_version, log_path};
use patchdoc_protocol::{
    EngineEvent, FileProgress, FileStatus, PatchProgress, PatchStatus, ProfileRegistry,
    ServiceProfile,
};
use patchdoc_transfer::{
    Downloader, ProgressThrottle, TransferProgress, crossed_step, join_url, validate_relative_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PatchError;
use crate::plan::{build_plan, essential_plan};
use crate::settings::SettingsReader;

/// Simultaneous transfers per run.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Byte-level progress is published on these percent boundaries only.
const PROGRESS_STEP: u8 = 10;

/// Caller-supplied values that take precedence over the log analysis.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisOverrides {
    pub web_root: Option<String>,
    pub backup_web_root: Option<String>,
    /// Scope the analysis to this client instance.
    pub pid: Option<u32>,
}

/// Result of a completed run. Per-file failures do not fail the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
    /// Files whose originals were saved to the backup directory.
    pub backed_up: Vec<String>,
    /// Patch version recorded with the backup that was restored.
    pub version: Option<String>,
}

impl PatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded == self.total
    }
}

#[derive(Debug, Default)]
struct RunState {
    status: PatchStatus,
    files: Vec<FileProgress>,
    completed: usize,
    error: Option<String>,
}

impl RunState {
    fn snapshot(&self) -> PatchProgress {
        let progress = PatchProgress::new(self.status, self.completed, self.files.clone());
        match &self.error {
            Some(error) => progress.with_error(error.clone()),
            None => progress,
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Claim on the manager for the duration of one flow.
struct Run<'a> {
    _guard: BusyGuard<'a>,
    cancel: CancellationToken,
}

/// Everything a file transfer needs, shared by the in-flight futures.
struct DownloadJob<'a> {
    install_path: &'a Path,
    temp_dir: PathBuf,
    web_root: &'a str,
    mirror: Option<&'a str>,
    backup: bool,
    cancel: &'a CancellationToken,
}

#[derive(Default)]
struct FileBackup {
    checked: bool,
    saved: bool,
}

struct FileResult {
    file: String,
    backed_up: bool,
    result: Result<(), PatchError>,
}

/// Repairs one install at a time.
pub struct PatchManager {
    downloader: Arc<dyn Downloader>,
    settings: Arc<dyn SettingsReader>,
    profiles: ProfileRegistry,
    bus: EventBus<EngineEvent>,
    busy: AtomicBool,
    stop: AtomicBool,
    cancel: Mutex<CancellationToken>,
    state: Mutex<RunState>,
    throttle: ProgressThrottle,
}

impl PatchManager {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        settings: Arc<dyn SettingsReader>,
        profiles: ProfileRegistry,
        bus: EventBus<EngineEvent>,
    ) -> Self {
        Self {
            downloader,
            settings,
            profiles,
            bus,
            busy: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            state: Mutex::new(RunState::default()),
            throttle: ProgressThrottle::default(),
        }
    }

    /// Whether a flow is currently running.
    pub fn is_patching(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Snapshot of the current (or last) run.
    pub fn progress(&self) -> PatchProgress {
        self.lock_state().snapshot()
    }

    /// Requests cancellation of the running flow.
    ///
    /// In-flight transfers abort and no further files are started.
    /// Returns `false` when nothing is running.
    pub fn cancel_patch(&self) -> bool {
        if !self.is_patching() {
            return false;
        }
        // `begin` holds this lock until the run's token is in place.
        let cancel = self.lock_cancel();
        self.stop.store(true, Ordering::SeqCst);
        cancel.cancel();
        drop(cancel);
        info!("repair cancellation requested");
        true
    }

    /// Rebuilds the failed patch plan from the client log and repairs it.
    pub async fn start_self_diagnosis(
        &self,
        install_path: &Path,
        service_id: &str,
        overrides: Option<DiagnosisOverrides>,
    ) -> Result<PatchOutcome, PatchError> {
        let run = self.begin()?;
        let result = self
            .self_diagnosis(&run, install_path, service_id, overrides.unwrap_or_default())
            .await;
        self.finish(run, result)
    }

    /// Re-downloads the essential executables from `web_root` without
    /// looking at the log.
    pub async fn force_restoration(
        &self,
        install_path: &Path,
        service_id: &str,
        web_root: &str,
    ) -> Result<PatchOutcome, PatchError> {
        let run = self.begin()?;
        let result = async {
            let profile = self.profile(service_id)?;
            let plan = essential_plan(&profile);
            info!(service = service_id, web_root, files = plan.len(), "forced restoration");
            self.process_downloads(&run, install_path, web_root, plan, None)
                .await
        }
        .await;
        self.finish(run, result)
    }

    /// Copies every file saved by the previous run back into the install.
    pub async fn restore_local_backup(
        &self,
        install_path: &Path,
    ) -> Result<PatchOutcome, PatchError> {
        let run = self.begin()?;
        let result = self.restore(&run, install_path).await;
        self.finish(run, result)
    }

    fn begin(&self) -> Result<Run<'_>, PatchError> {
        let mut slot = self.lock_cancel();
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("repair request rejected, another run is active");
            return Err(PatchError::AlreadyRunning);
        }
        let guard = BusyGuard(&self.busy);

        let cancel = CancellationToken::new();
        *slot = cancel.clone();
        self.stop.store(false, Ordering::SeqCst);
        drop(slot);

        *self.lock_state() = RunState::default();
        self.throttle.reset();

        Ok(Run {
            _guard: guard,
            cancel,
        })
    }

    fn finish(
        &self,
        run: Run<'_>,
        result: Result<PatchOutcome, PatchError>,
    ) -> Result<PatchOutcome, PatchError> {
        let result = result.map_err(|e| if e.is_cancelled() { PatchError::Cancelled } else { e });

        let snapshot = {
            let mut state = self.lock_state();
            match &result {
                Ok(_) => {
                    state.status = PatchStatus::Done;
                    state.error = None;
                }
                Err(e) => {
                    state.status = PatchStatus::Error;
                    state.error = Some(e.to_string());
                }
            }
            state.snapshot()
        };
        drop(run);

        match &result {
            Ok(outcome) => info!(
                total = outcome.total,
                succeeded = outcome.succeeded,
                failed = outcome.failed.len(),
                backed_up = outcome.backed_up.len(),
                "repair finished"
            ),
            Err(PatchError::Cancelled) => info!("repair cancelled"),
            Err(e) => error!(error = %e, "repair failed"),
        }

        self.publish(snapshot);
        result
    }

    async fn self_diagnosis(
        &self,
        run: &Run<'_>,
        install_path: &Path,
        service_id: &str,
        overrides: DiagnosisOverrides,
    ) -> Result<PatchOutcome, PatchError> {
        let profile = self.profile(service_id)?;
        let path = log_path(install_path, &profile);

        let analyzed = {
            let path = path.clone();
            let profile = profile.clone();
            let pid = overrides.pid;
            tokio::task::spawn_blocking(move || analyze_log(&path, &profile, pid))
                .await
                .map_err(std::io::Error::other)?
        };
        let info = match analyzed {
            Ok(info) => info,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PatchError::LogFileMissing(path));
            }
            Err(e) => return Err(e.into()),
        };

        let web_root = overrides
            .web_root
            .or_else(|| info.web_root.clone())
            .ok_or(PatchError::NoWebRoot)?;
        let mirror = overrides
            .backup_web_root
            .or_else(|| info.backup_web_root.clone());
        let plan = build_plan(&info, &profile);

        info!(
            service = service_id,
            web_root = %web_root,
            mirror = ?mirror,
            pid = ?info.pid,
            has_error = info.has_error,
            files = plan.len(),
            "self-diagnosis plan built"
        );

        self.process_downloads(run, install_path, &web_root, plan, mirror.as_deref())
            .await
    }

    async fn restore(&self, run: &Run<'_>, install_path: &Path) -> Result<PatchOutcome, PatchError> {
        let files = match file_ops::list_backup_files(install_path).await {
            Ok(files) if !files.is_empty() => files,
            Ok(_) => return Err(PatchError::NoBackup(file_ops::backup_dir(install_path))),
            Err(FileOpsError::NoBackup(dir)) => return Err(PatchError::NoBackup(dir)),
            Err(e) => return Err(e.into()),
        };

        let version = match file_ops::read_backup_info(install_path).await {
            Ok(info) => {
                for missing in info.files.iter().filter(|f| !files.contains(f)) {
                    warn!(file = %missing, "file recorded in backup info is missing");
                }
                Some(info.version)
            }
            Err(FileOpsError::NoBackup(_)) => {
                debug!("backup has no metadata, restoring listed files");
                None
            }
            Err(e) => {
                warn!(error = %e, "unreadable backup info, restoring listed files");
                None
            }
        };

        info!(
            path = %install_path.display(),
            files = files.len(),
            version = version.as_deref().unwrap_or("unknown"),
            "restoring local backup"
        );
        self.init_files(&files);

        let mut outcome = PatchOutcome {
            total: files.len(),
            version,
            ..Default::default()
        };
        for (index, file) in files.into_iter().enumerate() {
            if self.stop_requested(&run.cancel) {
                return Err(PatchError::Cancelled);
            }
            self.mark_downloading(index);
            match file_ops::restore_file(install_path, &file).await {
                Ok(_) => {
                    self.complete_file(index);
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "failed to restore file");
                    self.fail_file(index, e.to_string());
                    outcome.failed.push(file);
                }
            }
        }
        Ok(outcome)
    }

    async fn process_downloads(
        &self,
        run: &Run<'_>,
        install_path: &Path,
        web_root: &str,
        files: Vec<String>,
        mirror: Option<&str>,
    ) -> Result<PatchOutcome, PatchError> {
        self.init_files(&files);
        let temp_dir = file_ops::ensure_temp_dir(install_path).await?;

        let result = self
            .pump(run, install_path, temp_dir, web_root, files, mirror)
            .await;

        file_ops::remove_temp_dir(install_path).await;
        result
    }

    async fn pump(
        &self,
        run: &Run<'_>,
        install_path: &Path,
        temp_dir: PathBuf,
        web_root: &str,
        files: Vec<String>,
        mirror: Option<&str>,
    ) -> Result<PatchOutcome, PatchError> {
        let backup = self.settings.is_backup_enabled();
        if backup {
            file_ops::prepare_backup_dir(install_path).await?;
        }

        let job = DownloadJob {
            install_path,
            temp_dir,
            web_root,
            mirror: mirror.filter(|m| m.trim_end_matches('/') != web_root.trim_end_matches('/')),
            backup,
            cancel: &run.cancel,
        };

        let mut outcome = PatchOutcome {
            total: files.len(),
            ..Default::default()
        };
        let mut queue = files.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < MAX_CONCURRENT_DOWNLOADS && !self.stop_requested(job.cancel) {
                let Some((index, file)) = queue.next() else {
                    break;
                };
                in_flight.push(self.process_file(&job, index, file));
            }

            let Some(finished) = in_flight.next().await else {
                break;
            };
            if finished.backed_up {
                outcome.backed_up.push(finished.file.clone());
            }
            match finished.result {
                Ok(()) => outcome.succeeded += 1,
                Err(_) => outcome.failed.push(finished.file),
            }
        }

        if !outcome.backed_up.is_empty() {
            outcome.backed_up.sort();
            let version = extract_version(web_root);
            match file_ops::write_backup_info(install_path, &version, outcome.backed_up.clone())
                .await
            {
                Ok(_) => debug!(version = %version, files = outcome.backed_up.len(), "wrote backup info"),
                Err(e) => warn!(error = %e, "failed to write backup info"),
            }
        }

        if self.stop_requested(job.cancel) {
            return Err(PatchError::Cancelled);
        }
        Ok(outcome)
    }

    async fn process_file(&self, job: &DownloadJob<'_>, index: usize, file: String) -> FileResult {
        // Log names may use `\`; the URL, local paths and backup record share the `/` form.
        let file = file.replace('\\', "/");
        let mut backup = FileBackup::default();
        let result = self.repair_file(job, index, &file, &mut backup).await;

        match &result {
            Ok(()) => self.complete_file(index),
            Err(e) if e.is_cancelled() => self.fail_file(index, PatchError::Cancelled.to_string()),
            Err(e) => {
                warn!(file = %file, error = %e, "file repair failed");
                self.fail_file(index, e.to_string());
            }
        }

        FileResult {
            file,
            backed_up: backup.saved,
            result,
        }
    }

    async fn repair_file(
        &self,
        job: &DownloadJob<'_>,
        index: usize,
        file: &str,
        backup: &mut FileBackup,
    ) -> Result<(), PatchError> {
        validate_relative_path(file)?;
        self.mark_downloading(index);

        let err = match self.fetch_and_install(job, index, job.web_root, file, backup).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if err.is_cancelled() {
            return Err(PatchError::Cancelled);
        }
        let Some(mirror) = job.mirror else {
            return Err(err);
        };

        warn!(file, error = %err, mirror, "retrying from backup web root");
        self.fetch_and_install(job, index, mirror, file, backup).await
    }

    async fn fetch_and_install(
        &self,
        job: &DownloadJob<'_>,
        index: usize,
        root: &str,
        file: &str,
        backup: &mut FileBackup,
    ) -> Result<(), PatchError> {
        let url = join_url(root, file);
        let temp_path = job.temp_dir.join(file);
        let last_percent = AtomicU8::new(0);
        let on_progress =
            |progress: TransferProgress| self.on_transfer_progress(index, &last_percent, progress);

        let bytes = self
            .downloader
            .download(&url, &temp_path, job.cancel, &on_progress)
            .await?;
        debug!(file, url = %url, bytes, "downloaded");

        // The original must be saved before the destination is touched.
        if job.backup && !backup.checked {
            backup.checked = true;
            match file_ops::backup_file(job.install_path, file).await {
                Ok(saved) => backup.saved = saved,
                Err(e) => warn!(file, error = %e, "backup failed, installing anyway"),
            }
        }

        file_ops::install_file(&temp_path, &job.install_path.join(file)).await?;
        Ok(())
    }

    fn on_transfer_progress(&self, index: usize, last_percent: &AtomicU8, progress: TransferProgress) {
        let Some(percent) = progress.percent() else {
            return;
        };
        if !crossed_step(last_percent.load(Ordering::Relaxed), percent, PROGRESS_STEP) {
            return;
        }
        last_percent.store(percent, Ordering::Relaxed);

        let snapshot = {
            let mut state = self.lock_state();
            if let Some(entry) = state.files.get_mut(index) {
                entry.progress = percent;
            }
            state.snapshot()
        };
        if self.throttle.try_acquire() {
            self.publish(snapshot);
        }
    }

    fn init_files(&self, files: &[String]) {
        self.update(|state| {
            state.status = PatchStatus::Downloading;
            state.files = files.iter().map(FileProgress::waiting).collect();
            state.completed = 0;
            state.error = None;
        });
    }

    fn mark_downloading(&self, index: usize) {
        self.update(|state| {
            if let Some(entry) = state.files.get_mut(index) {
                entry.status = FileStatus::Downloading;
                entry.progress = 0;
                entry.error = None;
            }
        });
    }

    fn complete_file(&self, index: usize) {
        self.update(|state| {
            if let Some(entry) = state.files.get_mut(index) {
                entry.status = FileStatus::Done;
                entry.progress = 100;
                state.completed += 1;
            }
        });
    }

    fn fail_file(&self, index: usize, message: String) {
        self.update(|state| {
            if let Some(entry) = state.files.get_mut(index) {
                entry.status = FileStatus::Error;
                entry.error = Some(message);
            }
        });
    }

    fn update(&self, apply: impl FnOnce(&mut RunState)) {
        let snapshot = {
            let mut state = self.lock_state();
            apply(&mut state);
            state.snapshot()
        };
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: PatchProgress) {
        self.bus.publish(EngineEvent::PatchProgress(snapshot));
    }

    fn profile(&self, service_id: &str) -> Result<ServiceProfile, PatchError> {
        self.profiles
            .get(service_id)
            .cloned()
            .ok_or_else(|| PatchError::UnknownService(service_id.to_string()))
    }

    fn stop_requested(&self, cancel: &CancellationToken) -> bool {
        self.stop.load(Ordering::SeqCst) || cancel.is_cancelled()
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner())
    }
}
