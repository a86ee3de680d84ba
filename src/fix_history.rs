//! Applied-fix history (`fixhistory.json`)
//!
//! Newest first, at most one entry per app id. Reads never fail: a missing
//! or corrupt file is an empty history.

use crate::constants::{files, APP_NAME};
use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixHistoryEntry {
    pub app_id: String,
    pub game_name: String,
    pub install_path: String,
    pub fix_date: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct FixHistoryStore {
    path: PathBuf,
}

/// `<data dir>/basement/fixhistory.json`
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME).join(files::FIX_HISTORY_JSON))
}

impl FixHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_all(&self) -> Vec<FixHistoryEntry> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[fix_history] Ignoring corrupt {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[FixHistoryEntry]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
    }

    /// Replace any entry for the same app and put this one first.
    pub fn add(&self, entry: FixHistoryEntry) -> std::io::Result<()> {
        let mut entries = self.load_all();
        entries.retain(|e| e.app_id != entry.app_id);
        entries.insert(0, entry);
        self.save(&entries)
    }

    pub fn remove(&self, app_id: &str) -> std::io::Result<()> {
        let mut entries = self.load_all();
        let before = entries.len();
        entries.retain(|e| e.app_id != app_id);
        if entries.len() == before {
            return Ok(());
        }
        self.save(&entries)
    }
}
