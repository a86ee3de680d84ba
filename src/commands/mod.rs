//! Commands module - Re-exports all command submodules
//!
//! Each submodule groups related commands by domain. Commands are async,
//! push blocking filesystem work onto the blocking pool and report errors as
//! display strings.

pub mod backup;
pub mod fixes;
pub mod install;
pub mod keys;
pub mod library;
pub mod scripts;

pub use backup::*;
pub use fixes::*;
pub use install::*;
pub use keys::*;
pub use library::*;
pub use scripts::*;

use crate::fix_history::{default_history_path, FixHistoryStore};
use crate::lua_store::DepotScriptStore;
use crate::settings::{default_settings_path, AppSettings};
use crate::steam_locator::SteamLocator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process-wide state shared by every command.
#[derive(Debug, Clone)]
pub struct AppState {
    pub locator: Arc<SteamLocator>,
    pub settings_path: PathBuf,
    pub history_path: PathBuf,
}

impl AppState {
    pub fn new(settings_path: PathBuf, history_path: PathBuf) -> Self {
        let settings = AppSettings::load_from(&settings_path);
        Self {
            locator: Arc::new(SteamLocator::with_custom_path(
                settings.custom_steam_path.as_deref(),
            )),
            settings_path,
            history_path,
        }
    }

    /// State backed by the per-user config and data directories.
    pub fn from_default_paths() -> Result<Self, String> {
        let settings_path = default_settings_path().ok_or("Could not find config directory")?;
        let history_path = default_history_path().ok_or("Could not find data directory")?;
        Ok(Self::new(settings_path, history_path))
    }

    pub fn settings(&self) -> AppSettings {
        AppSettings::load_from(&self.settings_path)
    }

    pub fn history(&self) -> FixHistoryStore {
        FixHistoryStore::new(&self.history_path)
    }

    pub fn steam_path(&self) -> Result<PathBuf, String> {
        self.locator
            .locate()
            .ok_or_else(|| "Steam installation not found. Set a custom Steam path.".to_string())
    }

    pub fn script_store(&self) -> Result<DepotScriptStore, String> {
        let dir = self
            .locator
            .stplugin_path()
            .ok_or("Steam installation not found")?;
        Ok(DepotScriptStore::new(dir))
    }

    /// Explicit path if given, otherwise the installed location of `app_id`.
    pub fn install_path_for(&self, app_id: &str, explicit: Option<&Path>) -> Result<PathBuf, String> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => self
                .locator
                .resolve_install_path(app_id)
                .ok_or_else(|| format!("App {} is not installed in any Steam library", app_id)),
        }
    }
}

/// Run blocking work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| format!("Background task failed: {}", e))?
}
