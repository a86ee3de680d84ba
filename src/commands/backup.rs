//! User data backup commands

use super::{blocking, AppState};
use crate::data_backup::{self, BackupReport};
use crate::login_users;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Playtime,
    Achievements,
    AddedGames,
}

/// Back up one kind of data for the current Steam user into `out_dir`.
pub async fn backup_user_data(
    state: &AppState,
    kind: BackupKind,
    out_dir: PathBuf,
) -> Result<BackupReport, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        let user = login_users::current_user(&steam).ok_or("No Steam user found")?;
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| format!("Failed to create {}: {}", out_dir.display(), e))?;

        let result = match kind {
            BackupKind::Playtime => data_backup::backup_playtime(&steam, &user, &out_dir),
            BackupKind::Achievements => data_backup::backup_achievements(&steam, &user, &out_dir),
            BackupKind::AddedGames => data_backup::backup_added_games(&steam, &user, &out_dir),
        };
        result.map_err(|e| format!("Backup failed: {:#}", e))
    })
    .await
}

/// Extract a backup zip onto the Steam root. Returns restored file count.
pub async fn restore_user_data(state: &AppState, zip_path: PathBuf) -> Result<usize, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        data_backup::restore_backup(&steam, &zip_path).map_err(|e| format!("Restore failed: {:#}", e))
    })
    .await
}
