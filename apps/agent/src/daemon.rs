//! Long-running mode driven by newline-delimited JSON on stdin.
//!
//! Inbound messages use the same `{"type": ..., "payload": ...}` envelope
//! as the outbound event stream.

use std::path::PathBuf;
use std::sync::Arc;

use patchdoc_file_ops::expand_home;
use patchdoc_game_log::PathResolver;
use patchdoc_protocol::{EngineEvent, ErrorThresholdEvent};
use patchdoc_repair::{DiagnosisOverrides, PatchError};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::app::Agent;

/// A trigger from the process monitor or the user interface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Inbound {
    ProcessStarted(ProcessStarted),
    ProcessStopped(ProcessStopped),
    Repair(RepairRequest),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStarted {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStopped {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    pub install_path: String,
    pub service_id: String,
    #[serde(default)]
    pub web_root: Option<String>,
}

/// Runs until stdin closes or the process is interrupted.
pub async fn run(agent: &Agent) -> anyhow::Result<()> {
    let mut events = agent.bus.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("daemon ready, reading triggers from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Inbound>(&line) {
                    Ok(message) => agent.handle(message).await,
                    Err(e) => warn!(error = %e, "ignoring malformed trigger"),
                }
            }
            Some(event) = events.recv() => agent.on_event(&event),
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    agent.manager.cancel_patch();
    agent.watcher.stop_all().await;
    Ok(())
}

impl Agent {
    pub(crate) async fn handle(&self, message: Inbound) {
        match message {
            Inbound::ProcessStarted(process) => {
                let Some(game) = self
                    .config
                    .game_for_process(&process.name, process.path.as_deref())
                else {
                    debug!(process = %process.name, "ignoring unmanaged process");
                    return;
                };
                match self
                    .watcher
                    .start_monitoring(&game.service_id, &game.game_id, process.pid)
                    .await
                {
                    Ok(path) => info!(
                        service = %game.service_id,
                        game = %game.game_id,
                        pid = ?process.pid,
                        path = %path.display(),
                        "game started, monitoring log"
                    ),
                    Err(e) => warn!(
                        service = %game.service_id,
                        game = %game.game_id,
                        error = %e,
                        "failed to start log monitoring"
                    ),
                }
            }
            Inbound::ProcessStopped(process) => {
                if let Some(game) = self.config.game_for_process(&process.name, None) {
                    self.watcher
                        .stop_monitoring(&game.service_id, &game.game_id)
                        .await;
                }
            }
            Inbound::Repair(request) => {
                let overrides = DiagnosisOverrides {
                    web_root: request.web_root,
                    ..Default::default()
                };
                self.spawn_repair(
                    expand_home(&request.install_path),
                    request.service_id,
                    overrides,
                );
            }
            Inbound::Cancel => {
                if !self.manager.cancel_patch() {
                    debug!("cancel requested with no repair running");
                }
            }
        }
    }

    pub(crate) fn on_event(&self, event: &EngineEvent) {
        let EngineEvent::ErrorThresholdReached(threshold) = event else {
            return;
        };
        if !self.config.auto_repair {
            info!(
                service = %threshold.service_id,
                game = %threshold.game_id,
                errors = threshold.error_count,
                "repeated partial transfers detected, repair available"
            );
            return;
        }
        self.auto_repair(threshold);
    }

    fn auto_repair(&self, threshold: &ErrorThresholdEvent) {
        let Some(install) = self
            .config
            .resolve_install_path(&threshold.service_id, &threshold.game_id)
        else {
            warn!(
                service = %threshold.service_id,
                game = %threshold.game_id,
                "cannot auto-repair, install path unknown"
            );
            return;
        };
        info!(
            service = %threshold.service_id,
            game = %threshold.game_id,
            errors = threshold.error_count,
            "error threshold reached, starting automatic repair"
        );
        let overrides = DiagnosisOverrides {
            pid: threshold.pid,
            ..Default::default()
        };
        self.spawn_repair(install, threshold.service_id.clone(), overrides);
    }

    fn spawn_repair(&self, install: PathBuf, service_id: String, overrides: DiagnosisOverrides) {
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move {
            match manager
                .start_self_diagnosis(&install, &service_id, Some(overrides))
                .await
            {
                Ok(outcome) => info!(
                    service = %service_id,
                    total = outcome.total,
                    failed = outcome.failed.len(),
                    "repair finished"
                ),
                Err(PatchError::AlreadyRunning) => debug!("repair already in progress"),
                Err(e) => warn!(service = %service_id, error = %e, "repair did not complete"),
            }
        });
    }
}
