use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::scanner::IdentifierRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScannerSettings {
    pub min_identifier_len: usize,
    pub max_identifier_len: usize,
    /// How long a rejection message stays visible.
    pub transient_message_ms: u64,
    /// Label fragments marking a rear-facing camera, matched case-insensitively.
    pub preferred_camera_keywords: Vec<String>,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        let rules = IdentifierRules::default();
        Self {
            min_identifier_len: rules.min_len,
            max_identifier_len: rules.max_len,
            transient_message_ms: 3000,
            preferred_camera_keywords: vec!["back".into(), "rear".into(), "environment".into()],
        }
    }
}

impl ScannerSettings {
    pub fn rules(&self) -> IdentifierRules {
        IdentifierRules {
            min_len: self.min_identifier_len,
            max_len: self.max_identifier_len,
        }
    }

    pub fn transient_message_delay(&self) -> Duration {
        Duration::from_millis(self.transient_message_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSettings {
    pub base_url: String,
    #[serde(default = "default_allocations_path")]
    pub allocations_path: String,
}

fn default_allocations_path() -> String {
    "allocations".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    scanner: ScannerSettings,
    allocation: Option<AllocationSettings>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable settings in {}: {}",
                    path.display(),
                    err
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn scanner(&self) -> ScannerSettings {
        self.data.read().expect("settings lock poisoned").scanner.clone()
    }

    pub fn allocation(&self) -> Option<AllocationSettings> {
        self.data.read().expect("settings lock poisoned").allocation.clone()
    }

    pub fn update_scanner(&self, settings: ScannerSettings) -> Result<()> {
        let mut guard = self.data.write().expect("settings lock poisoned");
        guard.scanner = settings;
        self.persist(&guard)
    }

    /// Point allocations at a new API, or switch them off with `None`.
    pub fn update_allocation(&self, settings: Option<AllocationSettings>) -> Result<()> {
        let mut guard = self.data.write().expect("settings lock poisoned");
        guard.allocation = settings;
        self.persist(&guard)
    }

    /// Write the current settings to disk if no file exists yet, so there is
    /// a template to edit. Returns whether a file was written.
    pub fn write_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        let guard = self.data.read().expect("settings lock poisoned");
        self.persist(&guard)?;
        Ok(true)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
