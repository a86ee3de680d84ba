//! Game fix commands - apply, revert and history

use super::{blocking, AppState};
use crate::api;
use crate::error::FixError;
use crate::fix_applier::{self, ArchiveFixEngine, FixReport, FixTarget, UnfixOutcome};
use crate::fix_history::FixHistoryEntry;
use crate::fix_log::LOCAL_FILE;
use std::path::{Path, PathBuf};

fn fix_error(e: FixError) -> String {
    format!("Fix failed: {}", e)
}

async fn target_for(
    state: &AppState,
    app_id: &str,
    install_path: Option<PathBuf>,
) -> Result<FixTarget, String> {
    let install_path = {
        let state = state.clone();
        let app_id = app_id.to_string();
        blocking(move || state.install_path_for(&app_id, install_path.as_deref())).await?
    };
    if !install_path.is_dir() {
        return Err(format!("Install directory {} does not exist", install_path.display()));
    }
    Ok(FixTarget {
        app_id: app_id.to_string(),
        install_path,
        game_name: api::fetch_app_name(app_id).await,
    })
}

/// Apply a local fix archive. `password_provider` is asked only for
/// encrypted archives.
pub async fn apply_fix_from_file<P>(
    state: &AppState,
    app_id: String,
    archive: PathBuf,
    install_path: Option<PathBuf>,
    password_provider: P,
) -> Result<FixReport, String>
where
    P: FnOnce() -> Option<String> + Send + 'static,
{
    let target = target_for(state, &app_id, install_path).await?;
    let engine = ArchiveFixEngine::new(state.history());
    blocking(move || apply_local_archive(&engine, &archive, &target, password_provider)).await
}

fn apply_local_archive<P>(
    engine: &ArchiveFixEngine,
    archive: &Path,
    target: &FixTarget,
    password_provider: P,
) -> Result<FixReport, String>
where
    P: FnOnce() -> Option<String>,
{
    engine
        .apply_from_file(archive, target, LOCAL_FILE, password_provider)
        .map_err(fix_error)
}

/// Download and apply a fix. Without `url` the configured fix template is
/// used.
pub async fn apply_fix_from_url<P>(
    state: &AppState,
    app_id: String,
    url: Option<String>,
    install_path: Option<PathBuf>,
    password_provider: P,
) -> Result<FixReport, String>
where
    P: FnOnce() -> Option<String> + Send + 'static,
{
    let url = match url {
        Some(url) => url,
        None => fix_applier::fix_url(&state.settings().fix_base_url, &app_id)
            .ok_or_else(|| fix_error(FixError::NoFixUrl))?,
    };
    let target = target_for(state, &app_id, install_path).await?;
    let engine = ArchiveFixEngine::new(state.history());
    blocking(move || {
        engine
            .apply_from_url(&target, &url, password_provider)
            .map_err(fix_error)
    })
    .await
}

pub async fn unfix_game(
    state: &AppState,
    app_id: String,
    install_path: Option<PathBuf>,
) -> Result<UnfixOutcome, String> {
    let state = state.clone();
    blocking(move || {
        let install = state.install_path_for(&app_id, install_path.as_deref())?;
        ArchiveFixEngine::new(state.history())
            .unfix(&app_id, &install)
            .map_err(|e| format!("Unfix failed: {}", e))
    })
    .await
}

pub async fn get_fix_history(state: &AppState) -> Result<Vec<FixHistoryEntry>, String> {
    let history = state.history();
    blocking(move || Ok(history.load_all())).await
}

/// URL of the fix for `app_id` if the configured host has one.
pub async fn check_fix_available(state: &AppState, app_id: String) -> Result<Option<String>, String> {
    let Some(url) = fix_applier::fix_url(&state.settings().fix_base_url, &app_id) else {
        return Ok(None);
    };
    blocking(move || Ok(fix_applier::check_for_fix(&url).then_some(url))).await
}
