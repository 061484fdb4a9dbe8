//! Directory names and scratch-space handling under an install path.

use std::path::{Path, PathBuf};

use crate::FileOpsError;

/// Scratch directory downloads are written to before installation.
pub const TEMP_DIR_NAME: &str = ".patch_temp";

/// Directory holding pre-repair copies of overwritten files.
pub const BACKUP_DIR_NAME: &str = ".patch_backups";

pub fn temp_dir(install_path: &Path) -> PathBuf {
    install_path.join(TEMP_DIR_NAME)
}

pub fn backup_dir(install_path: &Path) -> PathBuf {
    install_path.join(BACKUP_DIR_NAME)
}

/// Creates the scratch directory if needed and returns its path.
pub async fn ensure_temp_dir(install_path: &Path) -> Result<PathBuf, FileOpsError> {
    let dir = temp_dir(install_path);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| FileOpsError::io(&dir, e))?;
    Ok(dir)
}

/// Removes the scratch directory. Failures are logged, never returned.
pub async fn remove_temp_dir(install_path: &Path) {
    let dir = temp_dir(install_path);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => tracing::debug!(path = %dir.display(), "removed temp directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to remove temp directory"),
    }
}

/// Copies a downloaded file over its destination, creating parent directories.
pub async fn install_file(source: &Path, dest: &Path) -> Result<u64, FileOpsError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FileOpsError::io(parent, e))?;
    }
    tokio::fs::copy(source, dest)
        .await
        .map_err(|e| FileOpsError::io(dest, e))
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let install = Path::new("/games/poe");
        assert_eq!(temp_dir(install), PathBuf::from("/games/poe/.patch_temp"));
        assert_eq!(backup_dir(install), PathBuf::from("/games/poe/.patch_backups"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/opt/games"), PathBuf::from("/opt/games"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }

    #[test]
    fn expand_home_replaces_tilde() {
        let expanded = expand_home("~/Games/PoE");
        assert!(expanded.ends_with("Games/PoE"));
        assert!(!expanded.starts_with("~"));
    }

    #[tokio::test]
    async fn temp_dir_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ensure_temp_dir(tmp.path()).await.unwrap();
        assert!(dir.is_dir());
        std::fs::write(dir.join("partial.dat"), b"x").unwrap();

        remove_temp_dir(tmp.path()).await;
        assert!(!dir.exists());

        // Second removal is a silent no-op.
        remove_temp_dir(tmp.path()).await;
    }

    #[tokio::test]
    async fn install_file_creates_parents_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("download.bin");
        std::fs::write(&src, b"new contents").unwrap();

        let dest = tmp.path().join("Bundles2").join("a.bundle");
        install_file(&src, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new contents");

        std::fs::write(&src, b"newer").unwrap();
        install_file(&src, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
    }
}
