use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a relative file path does not escape its base directory.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
///
/// Backslashes are treated as separators, since file names come from a
/// Windows client log.
pub fn validate_relative_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.trim().is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let normalized = file_path.replace('\\', "/");
    let path = Path::new(&normalized);

    if path.is_absolute() || normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {file_path}"
                )));
            }
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {file_path}"
                )));
            }
            Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("   ").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_relative_path("../../../etc/passwd").is_err());
        assert!(validate_relative_path("sub/../../escape").is_err());
    }

    #[test]
    fn rejects_backslash_traversal() {
        assert!(validate_relative_path("..\\Windows\\evil.dll").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(validate_relative_path("/tmp/malicious").is_err());
        assert!(validate_relative_path("C:\\Windows\\evil.dll").is_err());
        assert!(validate_relative_path("c:/evil.exe").is_err());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_relative_path("PathOfExile.exe").is_ok());
    }

    #[test]
    fn accepts_subdirectory_path() {
        assert!(validate_relative_path("Bundles2/_.index.bin").is_ok());
        assert!(validate_relative_path("Bundles2\\Folders\\a.bundle").is_ok());
    }

    #[test]
    fn accepts_current_dir_prefix() {
        assert!(validate_relative_path("./Client.exe").is_ok());
    }
}
