//! Persisted application settings (`<config dir>/basement/settings.json`)

use crate::constants::{files, urls, APP_NAME};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Overrides Steam auto-detection when set.
    pub custom_steam_path: Option<String>,
    /// Fix download template, `{appid}` is replaced.
    pub fix_base_url: String,
    pub api_base_url: String,
    pub api_key: String,
    pub auto_upload_config_keys: bool,
    pub last_config_keys_upload: Option<DateTime<Utc>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            custom_steam_path: None,
            fix_base_url: urls::DEFAULT_FIX_BASE.to_string(),
            api_base_url: urls::DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            auto_upload_config_keys: false,
            last_config_keys_upload: None,
        }
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(files::SETTINGS_JSON))
}

impl AppSettings {
    /// Missing or unreadable settings fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("[settings] Ignoring corrupt {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn load() -> Self {
        default_settings_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings dir: {}", e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to save settings: {}", e))?;
        info!("[settings] Saved {}", path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<(), String> {
        let path = default_settings_path().ok_or("Could not find config directory")?;
        self.save_to(&path)
    }
}
