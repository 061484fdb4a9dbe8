use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-service data: where the client logs and which files it cannot start without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceProfile {
    pub id: String,
    /// File name under `<install>/logs/`.
    pub log_file_name: String,
    #[serde(default)]
    pub essential_executables: Vec<String>,
}

impl ServiceProfile {
    pub fn new(
        id: impl Into<String>,
        log_file_name: impl Into<String>,
        essential_executables: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            log_file_name: log_file_name.into(),
            essential_executables: essential_executables.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `file_name` is one of the essential executables (ASCII case-insensitive).
    pub fn is_essential(&self, file_name: &str) -> bool {
        self.essential_executables
            .iter()
            .any(|e| e.eq_ignore_ascii_case(file_name))
    }
}

/// Service profiles keyed by service id.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, ServiceProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// The profiles shipped with the engine.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(ServiceProfile::new(
            "ggg",
            "Client.txt",
            &["PathOfExile.exe", "PathOfExile_x64.exe"],
        ));
        registry.insert(ServiceProfile::new(
            "steam",
            "Client.txt",
            &["PathOfExileSteam.exe", "PathOfExile_x64Steam.exe"],
        ));
        registry.insert(ServiceProfile::new(
            "kakao",
            "KakaoClient.txt",
            &["PathOfExile_KG.exe", "PathOfExile_x64_KG.exe"],
        ));
        registry
    }

    /// Adds or replaces a profile.
    pub fn insert(&mut self, profile: ServiceProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_profile(mut self, profile: ServiceProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceProfile> {
        self.profiles.get(service_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
