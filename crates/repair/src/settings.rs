/// Runtime settings the repair manager consults on every run.
pub trait SettingsReader: Send + Sync {
    /// Whether files are copied to the backup directory before being overwritten.
    fn is_backup_enabled(&self) -> bool {
        true
    }
}

/// Settings fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct FixedSettings {
    pub backup_enabled: bool,
}

impl Default for FixedSettings {
    fn default() -> Self {
        Self {
            backup_enabled: true,
        }
    }
}

impl SettingsReader for FixedSettings {
    fn is_backup_enabled(&self) -> bool {
        self.backup_enabled
    }
}
