//! Library management commands - Steam location, libraries, installs, users

use super::{blocking, AppState};
use crate::login_users::{self, SteamUser};
use crate::settings::AppSettings;
use crate::steam_locator::SteamLocator;
use crate::steam_process;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct SteamInfo {
    pub steam_path: String,
    pub library_folders: Vec<String>,
    pub running: bool,
}

fn display(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

pub async fn locate_steam(state: &AppState) -> Result<SteamInfo, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        Ok(SteamInfo {
            steam_path: display(&steam),
            library_folders: SteamLocator::list_library_folders(&steam)
                .iter()
                .map(|p| display(p))
                .collect(),
            running: steam_process::is_steam_running(),
        })
    })
    .await
}

/// Validate and persist a custom Steam root.
pub async fn set_steam_path(state: &AppState, path: String) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        let expanded = PathBuf::from(shellexpand::tilde(&path).to_string());
        if !state.locator.set_custom_path(&expanded) {
            return Err(format!(
                "{} is not a Steam installation (launcher missing)",
                expanded.display()
            ));
        }
        let mut settings = AppSettings::load_from(&state.settings_path);
        settings.custom_steam_path = Some(display(&expanded));
        settings.save_to(&state.settings_path)
    })
    .await
}

pub async fn get_library_folders(state: &AppState) -> Result<Vec<String>, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        Ok(SteamLocator::list_library_folders(&steam)
            .iter()
            .map(|p| display(p))
            .collect())
    })
    .await
}

/// Install directory of an app, or `None` if no library has it.
pub async fn get_install_path(state: &AppState, app_id: String) -> Result<Option<String>, String> {
    let state = state.clone();
    blocking(move || {
        state.steam_path()?;
        Ok(state
            .locator
            .resolve_install_path(&app_id)
            .map(|p| display(&p)))
    })
    .await
}

pub async fn get_current_user(state: &AppState) -> Result<Option<SteamUser>, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        Ok(login_users::current_user(&steam))
    })
    .await
}

pub async fn restart_steam(state: &AppState) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        let launcher = state
            .locator
            .launcher_path()
            .ok_or("Steam installation not found")?;
        info!("[library] Restarting Steam");
        steam_process::restart_steam(&launcher)
    })
    .await
}
