//! Backup directory management and `backup-info.json`.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use patchdoc_protocol::{BACKUP_INFO_FILE, BackupInfo};

use crate::FileOpsError;
use crate::layout::{backup_dir, install_file};

/// Deletes any previous backup and recreates an empty backup directory.
///
/// Only the most recent repair's originals are retained.
pub async fn prepare_backup_dir(install_path: &Path) -> Result<PathBuf, FileOpsError> {
    let dir = backup_dir(install_path);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => tracing::debug!(path = %dir.display(), "cleared previous backup"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(FileOpsError::io(&dir, e)),
    }
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| FileOpsError::io(&dir, e))?;
    Ok(dir)
}

/// Copies `install_path/relative` into the backup directory.
///
/// Returns `false` without touching the backup when the file does not
/// exist yet.
pub async fn backup_file(install_path: &Path, relative: &str) -> Result<bool, FileOpsError> {
    let source = install_path.join(relative);
    match tokio::fs::metadata(&source).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(FileOpsError::io(&source, e)),
    }

    let dest = backup_dir(install_path).join(relative);
    install_file(&source, &dest).await?;
    tracing::debug!(file = relative, "backed up original");
    Ok(true)
}

/// Copies a backed-up file back to its original location.
pub async fn restore_file(install_path: &Path, relative: &str) -> Result<u64, FileOpsError> {
    let source = backup_dir(install_path).join(relative);
    install_file(&source, &install_path.join(relative)).await
}

/// Writes `backup-info.json` with the current time.
pub async fn write_backup_info(
    install_path: &Path,
    version: &str,
    files: Vec<String>,
) -> Result<BackupInfo, FileOpsError> {
    let info = BackupInfo {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: version.to_string(),
        files,
    };

    let dir = backup_dir(install_path);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| FileOpsError::io(&dir, e))?;

    let path = dir.join(BACKUP_INFO_FILE);
    let json = serde_json::to_vec_pretty(&info)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| FileOpsError::io(&path, e))?;
    Ok(info)
}

pub async fn read_backup_info(install_path: &Path) -> Result<BackupInfo, FileOpsError> {
    let path = backup_dir(install_path).join(BACKUP_INFO_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FileOpsError::NoBackup(backup_dir(install_path)));
        }
        Err(e) => return Err(FileOpsError::io(&path, e)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Lists every backed-up file, relative to the backup root with `/`
/// separators, sorted. The metadata file is excluded.
pub async fn list_backup_files(install_path: &Path) -> Result<Vec<String>, FileOpsError> {
    let root = backup_dir(install_path);
    if !tokio::fs::try_exists(&root)
        .await
        .map_err(|e| FileOpsError::io(&root, e))?
    {
        return Err(FileOpsError::NoBackup(root));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| FileOpsError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FileOpsError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FileOpsError::io(&path, e))?;

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if relative != BACKUP_INFO_FILE {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_clears_previous_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = backup_dir(tmp.path());
        std::fs::create_dir_all(dir.join("old")).unwrap();
        std::fs::write(dir.join("old").join("stale.dll"), b"stale").unwrap();

        let prepared = prepare_backup_dir(tmp.path()).await.unwrap();
        assert_eq!(prepared, dir);
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn backup_copies_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("Bundles2")).unwrap();
        std::fs::write(tmp.path().join("Bundles2/_.index.bin"), b"original index").unwrap();
        prepare_backup_dir(tmp.path()).await.unwrap();

        assert!(backup_file(tmp.path(), "Bundles2/_.index.bin").await.unwrap());
        assert_eq!(
            std::fs::read(backup_dir(tmp.path()).join("Bundles2/_.index.bin")).unwrap(),
            b"original index"
        );
    }

    #[tokio::test]
    async fn backup_skips_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        prepare_backup_dir(tmp.path()).await.unwrap();

        assert!(!backup_file(tmp.path(), "PathOfExile.exe").await.unwrap());
        assert!(!backup_dir(tmp.path()).join("PathOfExile.exe").exists());
    }

    #[tokio::test]
    async fn backup_info_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let written = write_backup_info(tmp.path(), "3.25.1.2", vec!["Client.exe".into()])
            .await
            .unwrap();
        assert!(written.timestamp.ends_with('Z'));

        let read = read_backup_info(tmp.path()).await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn read_backup_info_without_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_backup_info(tmp.path()).await.unwrap_err();
        assert!(matches!(err, FileOpsError::NoBackup(_)));
    }

    #[tokio::test]
    async fn list_is_recursive_sorted_and_excludes_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = prepare_backup_dir(tmp.path()).await.unwrap();
        std::fs::create_dir_all(dir.join("Bundles2/Folders")).unwrap();
        std::fs::write(dir.join("PathOfExile.exe"), b"a").unwrap();
        std::fs::write(dir.join("Bundles2/Folders/b.bundle"), b"b").unwrap();
        std::fs::write(dir.join("Bundles2/_.index.bin"), b"c").unwrap();
        write_backup_info(tmp.path(), "unknown", vec![]).await.unwrap();

        let files = list_backup_files(tmp.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                "Bundles2/Folders/b.bundle".to_string(),
                "Bundles2/_.index.bin".to_string(),
                "PathOfExile.exe".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn list_without_backup_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_backup_files(tmp.path()).await,
            Err(FileOpsError::NoBackup(_))
        ));
    }

    #[tokio::test]
    async fn restore_puts_original_back() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Client.exe"), b"v1").unwrap();
        prepare_backup_dir(tmp.path()).await.unwrap();
        backup_file(tmp.path(), "Client.exe").await.unwrap();

        std::fs::write(tmp.path().join("Client.exe"), b"v2 corrupted").unwrap();
        restore_file(tmp.path(), "Client.exe").await.unwrap();
        assert_eq!(std::fs::read(tmp.path().join("Client.exe")).unwrap(), b"v1");
    }
}
