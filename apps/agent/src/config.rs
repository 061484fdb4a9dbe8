//! Agent configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/patchdoc/agent.toml`
//! - Windows: `%APPDATA%/patchdoc/agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use patchdoc_file_ops::expand_home;
use patchdoc_game_log::{PathResolver, WatcherConfig};
use patchdoc_protocol::{ProfileRegistry, ServiceProfile};
use patchdoc_repair::SettingsReader;
use serde::{Deserialize, Serialize};

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Copy originals to `.patch_backups` before overwriting them.
    #[serde(default = "default_true")]
    pub backup_enabled: bool,

    /// Start a self-diagnosis as soon as the error threshold is reached.
    #[serde(default)]
    pub auto_repair: bool,

    /// Per-file download timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Log poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Partial-transfer lines per session before a repair is suggested.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Installed games, keyed by `(service_id, game_id)`.
    #[serde(default)]
    pub games: Vec<GameEntry>,

    /// Service profiles replacing or extending the built-in ones.
    #[serde(default)]
    pub services: Vec<ServiceProfile>,
}

/// One installed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    pub service_id: String,
    pub game_id: String,
    pub install_path: String,
    /// Executable names reported by the process monitor for this game.
    #[serde(default)]
    pub process_names: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_error_threshold() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_enabled: default_true(),
            auto_repair: false,
            request_timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            error_threshold: default_error_threshold(),
            games: Vec::new(),
            services: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), games = config.games.len(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Built-in profiles with the configured overrides applied.
    pub fn profiles(&self) -> ProfileRegistry {
        self.services
            .iter()
            .cloned()
            .fold(ProfileRegistry::builtin(), ProfileRegistry::with_profile)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            error_threshold: self.error_threshold.max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Finds the game a process belongs to, by executable name.
    ///
    /// `path` is consulted when `name` alone does not match.
    pub fn game_for_process(&self, name: &str, path: Option<&str>) -> Option<&GameEntry> {
        let file_name = path.and_then(|p| p.rsplit(['/', '\\']).next());
        self.games.iter().find(|game| {
            game.process_names.iter().any(|candidate| {
                candidate.eq_ignore_ascii_case(name)
                    || file_name.is_some_and(|f| candidate.eq_ignore_ascii_case(f))
            })
        })
    }

    pub fn game(&self, service_id: &str, game_id: &str) -> Option<&GameEntry> {
        self.games
            .iter()
            .find(|g| g.service_id == service_id && g.game_id == game_id)
    }
}

impl PathResolver for Config {
    fn resolve_install_path(&self, service_id: &str, game_id: &str) -> Option<PathBuf> {
        self.game(service_id, game_id)
            .map(|g| expand_home(&g.install_path))
    }
}

impl SettingsReader for Config {
    fn is_backup_enabled(&self) -> bool {
        self.backup_enabled
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("patchdoc").join("agent.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("patchdoc")
            .join("agent.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            games: vec![GameEntry {
                service_id: "ggg".into(),
                game_id: "poe1".into(),
                install_path: "/opt/poe".into(),
                process_names: vec!["PathOfExile.exe".into(), "PathOfExile_x64.exe".into()],
            }],
            ..Config::default()
        }
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.backup_enabled);
        assert!(!config.auto_repair);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.error_threshold, 10);
        assert!(config.games.is_empty());
    }

    #[test]
    fn config_partial_toml() {
        let config: Config = toml::from_str("auto_repair = true").unwrap();
        assert!(config.auto_repair);
        assert!(config.backup_enabled);
        assert_eq!(config.error_threshold, 10);
    }

    #[test]
    fn config_full_toml() {
        let toml_str = r#"
            backup_enabled = false
            error_threshold = 3

            [[games]]
            service_id = "kakao"
            game_id = "poe1"
            install_path = "D:/Games/PoE"
            process_names = ["PathOfExile_KG.exe"]

            [[services]]
            id = "custom"
            log_file_name = "Custom.txt"
            essential_executables = ["Custom.exe"]
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.backup_enabled);
        assert!(!config.is_backup_enabled());
        assert_eq!(config.watcher_config().error_threshold, 3);
        assert_eq!(
            config.resolve_install_path("kakao", "poe1"),
            Some(PathBuf::from("D:/Games/PoE"))
        );

        let profiles = config.profiles();
        assert_eq!(profiles.len(), 4);
        assert_eq!(profiles.get("custom").unwrap().log_file_name, "Custom.txt");
        assert!(profiles.get("ggg").is_some());
    }

    #[test]
    fn service_override_replaces_builtin() {
        let config = Config {
            services: vec![ServiceProfile::new("steam", "Steam.txt", &["Poe.exe"])],
            ..Config::default()
        };
        let profiles = config.profiles();
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles.get("steam").unwrap().essential_executables, vec!["Poe.exe"]);
    }

    #[test]
    fn process_lookup() {
        let config = sample();
        assert_eq!(
            config.game_for_process("pathofexile_x64.exe", None).map(|g| g.game_id.as_str()),
            Some("poe1")
        );
        assert!(
            config
                .game_for_process("launcher", Some("C:\\Games\\PoE\\PathOfExile.exe"))
                .is_some()
        );
        assert!(config.game_for_process("notepad.exe", None).is_none());
    }

    #[test]
    fn unknown_game_does_not_resolve() {
        let config = sample();
        assert_eq!(
            config.resolve_install_path("ggg", "poe1"),
            Some(PathBuf::from("/opt/poe"))
        );
        assert!(config.resolve_install_path("ggg", "poe2").is_none());
        assert!(config.resolve_install_path("steam", "poe1").is_none());
    }

    #[test]
    fn config_path_not_empty() {
        assert!(config_path().to_string_lossy().contains("patchdoc"));
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("agent.toml");

        let config = Config {
            auto_repair: true,
            ..sample()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.auto_repair);
        assert_eq!(loaded.games, config.games);
    }

    #[test]
    fn load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("agent.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.error_threshold, 10);
    }
}
