use serde::{Deserialize, Serialize};

/// Name of the metadata file written into the backup directory.
pub const BACKUP_INFO_FILE: &str = "backup-info.json";

/// Metadata describing the most recent backup (`backup-info.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// ISO-8601 creation time.
    pub timestamp: String,
    /// Client version parsed from the web root, or `"unknown"`.
    pub version: String,
    /// Paths relative to the install directory.
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_info_json_shape() {
        let info = BackupInfo {
            timestamp: "2026-01-01T12:00:00.000Z".into(),
            version: "3.25.1.2".into(),
            files: vec!["PathOfExile.exe".into(), "Bundles2/_.index.bin".into()],
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["version"], "3.25.1.2");
        assert_eq!(value["files"][1], "Bundles2/_.index.bin");

        let parsed: BackupInfo = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, info);
    }
}
