//! Application orchestrator: wires the watcher, the repair manager and the
//! event stream together and runs one command.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use patchdoc_event_bus::EventBus;
use patchdoc_game_log::{LogWatcher, PathResolver};
use patchdoc_protocol::EngineEvent;
use patchdoc_repair::{DiagnosisOverrides, PatchError, PatchManager, PatchOutcome, SettingsReader};
use patchdoc_transfer::HttpDownloader;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::Command;
use crate::config::Config;

/// How long pending events may take to reach stdout at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The wired-up engine.
pub struct Agent {
    pub(crate) config: Arc<Config>,
    pub(crate) bus: EventBus<EngineEvent>,
    pub(crate) watcher: LogWatcher,
    pub(crate) manager: Arc<PatchManager>,
}

impl Agent {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let bus = EventBus::new();
        let profiles = config.profiles();

        let resolver: Arc<dyn PathResolver> = config.clone();
        let watcher = LogWatcher::new(resolver, profiles.clone(), bus.clone(), config.watcher_config());

        let downloader = HttpDownloader::new(config.request_timeout())
            .context("failed to build HTTP client")?;
        let settings: Arc<dyn SettingsReader> = config.clone();
        let manager = Arc::new(PatchManager::new(
            Arc::new(downloader),
            settings,
            profiles,
            bus.clone(),
        ));

        Ok(Self {
            config,
            bus,
            watcher,
            manager,
        })
    }

    pub(crate) fn install_path(&self, service: &str, game: &str) -> anyhow::Result<PathBuf> {
        self.config
            .resolve_install_path(service, game)
            .with_context(|| format!("no install path configured for {service}/{game}"))
    }
}

/// Runs `command` until it completes or the process is interrupted.
pub async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let agent = Agent::new(config)?;
    let printer = spawn_event_printer(&agent.bus);

    let result = match command {
        Command::Watch { service, game, pid } => watch(&agent, &service, &game, pid).await,
        Command::Repair {
            service,
            game,
            web_root,
            pid,
        } => {
            let install = agent.install_path(&service, &game)?;
            let overrides = DiagnosisOverrides {
                web_root,
                pid,
                ..Default::default()
            };
            let flow = agent
                .manager
                .start_self_diagnosis(&install, &service, Some(overrides));
            report(run_flow(&agent.manager, flow).await)
        }
        Command::Force {
            service,
            game,
            web_root,
        } => {
            let install = agent.install_path(&service, &game)?;
            let flow = agent.manager.force_restoration(&install, &service, &web_root);
            report(run_flow(&agent.manager, flow).await)
        }
        Command::Restore { service, game } => {
            let install = agent.install_path(&service, &game)?;
            let flow = agent.manager.restore_local_backup(&install);
            report(run_flow(&agent.manager, flow).await)
        }
        Command::Daemon => crate::daemon::run(&agent).await,
    };

    drop(agent);
    if tokio::time::timeout(DRAIN_TIMEOUT, printer).await.is_err() {
        tracing::debug!("event stream not drained before shutdown");
    }
    result
}

async fn watch(agent: &Agent, service: &str, game: &str, pid: Option<u32>) -> anyhow::Result<()> {
    let path = agent.watcher.start_monitoring(service, game, pid).await?;
    tracing::info!(path = %path.display(), "watching client log, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, stopping");
    agent.watcher.stop_all().await;
    Ok(())
}

/// Drives a repair flow, cancelling it on Ctrl-C and waiting for cleanup.
async fn run_flow(
    manager: &PatchManager,
    flow: impl Future<Output = Result<PatchOutcome, PatchError>>,
) -> Result<PatchOutcome, PatchError> {
    tokio::pin!(flow);
    tokio::select! {
        result = &mut flow => return result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, cancelling repair");
            manager.cancel_patch();
        }
    }
    flow.await
}

fn report(result: Result<PatchOutcome, PatchError>) -> anyhow::Result<()> {
    let outcome = result?;
    for file in &outcome.failed {
        tracing::warn!(file = %file, "file was not repaired");
    }
    if !outcome.failed.is_empty() {
        anyhow::bail!(
            "{} of {} files could not be repaired",
            outcome.failed.len(),
            outcome.total
        );
    }
    tracing::info!(
        files = outcome.total,
        backed_up = outcome.backed_up.len(),
        version = ?outcome.version,
        "repair complete"
    );
    Ok(())
}

/// Writes every published event to stdout as one JSON line.
///
/// The task ends once every bus handle has been dropped and the queue is empty.
pub(crate) fn spawn_event_printer(bus: &EventBus<EngineEvent>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = rx.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(kind = event.kind(), error = %e, "failed to encode event");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                tracing::debug!("stdout closed, event stream stopped");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameEntry;

    fn config_for(install: &std::path::Path) -> Config {
        Config {
            games: vec![GameEntry {
                service_id: "ggg".into(),
                game_id: "poe1".into(),
                install_path: install.to_string_lossy().into_owned(),
                process_names: vec!["PathOfExile.exe".into()],
            }],
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn agent_resolves_configured_games() {
        let tmp = tempfile::tempdir().unwrap();
        let agent = Agent::new(config_for(tmp.path())).unwrap();

        assert_eq!(agent.install_path("ggg", "poe1").unwrap(), tmp.path());
        let err = agent.install_path("ggg", "poe2").unwrap_err();
        assert!(err.to_string().contains("ggg/poe2"));
    }

    #[tokio::test]
    async fn restore_without_backup_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let agent = Agent::new(config_for(tmp.path())).unwrap();

        let flow = agent.manager.restore_local_backup(tmp.path());
        let result = run_flow(&agent.manager, flow).await;
        assert!(matches!(result, Err(PatchError::NoBackup(_))));
        assert!(report(result).is_err());
    }

    #[test]
    fn report_flags_partial_failures() {
        let partial = PatchOutcome {
            total: 2,
            succeeded: 1,
            failed: vec!["a.dat".into()],
            ..Default::default()
        };
        let err = report(Ok(partial)).unwrap_err();
        assert!(err.to_string().contains("1 of 2"));

        let complete = PatchOutcome {
            total: 2,
            succeeded: 2,
            ..Default::default()
        };
        assert!(report(Ok(complete)).is_ok());
    }
}
