//! Depot script commands - list, toggle, patch and update pinning

use super::{blocking, AppState};
use crate::lua_parser::DepotInfo;
use crate::lua_store::{DepotScriptStore, PatchResult};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct ScriptInfo {
    pub app_id: String,
    pub path: String,
    pub enabled: bool,
    pub updates_disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub app_id: String,
    pub result: PatchResult,
}

fn script_info(path: &Path, enabled: bool, pinned: &[String]) -> ScriptInfo {
    let app_id = DepotScriptStore::extract_app_id(path);
    ScriptInfo {
        updates_disabled: enabled && pinned.contains(&app_id),
        app_id,
        path: path.to_string_lossy().to_string(),
        enabled,
    }
}

pub async fn list_scripts(state: &AppState) -> Result<Vec<ScriptInfo>, String> {
    let state = state.clone();
    blocking(move || {
        let store = state.script_store()?;
        let (active, disabled) = store
            .list_scripts()
            .map_err(|e| format!("Failed to list scripts: {}", e))?;
        let pinned = store.list_disabled_update_app_ids();

        Ok(active
            .iter()
            .map(|p| script_info(p, true, &pinned))
            .chain(disabled.iter().map(|p| script_info(p, false, &pinned)))
            .collect())
    })
    .await
}

pub async fn patch_script(state: &AppState, app_id: String) -> Result<PatchResult, String> {
    let state = state.clone();
    blocking(move || {
        let store = state.script_store()?;
        store
            .patch(&store.active_path(&app_id))
            .map_err(|e| format!("Failed to patch {}: {}", app_id, e))
    })
    .await
}

/// Patch every active script; a failure on one script does not stop the rest.
pub async fn patch_all_scripts(state: &AppState) -> Result<Vec<PatchOutcome>, String> {
    let state = state.clone();
    blocking(move || {
        let store = state.script_store()?;
        let (active, _) = store
            .list_scripts()
            .map_err(|e| format!("Failed to list scripts: {}", e))?;

        let mut outcomes = Vec::new();
        for path in active {
            let app_id = DepotScriptStore::extract_app_id(&path);
            match store.patch(&path) {
                Ok(result) => outcomes.push(PatchOutcome { app_id, result }),
                Err(e) => log::warn!("[scripts] Failed to patch {}: {}", app_id, e),
            }
        }
        Ok(outcomes)
    })
    .await
}

pub async fn enable_script(state: &AppState, app_id: String) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        state
            .script_store()?
            .enable(&app_id)
            .map_err(|e| format!("Failed to enable {}: {}", app_id, e))
    })
    .await
}

pub async fn disable_script(state: &AppState, app_id: String) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        state
            .script_store()?
            .disable(&app_id)
            .map_err(|e| format!("Failed to disable {}: {}", app_id, e))
    })
    .await
}

pub async fn delete_script(state: &AppState, app_id: String) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        state
            .script_store()?
            .delete(&app_id)
            .map_err(|e| format!("Failed to delete {}: {}", app_id, e))
    })
    .await
}

pub async fn disable_updates(state: &AppState, app_id: String) -> Result<(), String> {
    let state = state.clone();
    blocking(move || {
        state
            .script_store()?
            .disable_auto_updates_for(&app_id)
            .map_err(|e| format!("Failed to disable updates for {}: {}", app_id, e))
    })
    .await
}

/// Re-enable updates for one app, or for every script when `app_id` is
/// `None`. Returns the number of scripts rewritten.
pub async fn enable_updates(state: &AppState, app_id: Option<String>) -> Result<usize, String> {
    let state = state.clone();
    blocking(move || {
        let store = state.script_store()?;
        match app_id {
            Some(id) => store
                .enable_auto_updates_for(&id)
                .map(usize::from)
                .map_err(|e| format!("Failed to enable updates for {}: {}", id, e)),
            None => store
                .enable_auto_updates_for_all()
                .map_err(|e| format!("Failed to enable updates: {}", e)),
        }
    })
    .await
}

pub async fn list_updates_disabled(state: &AppState) -> Result<Vec<String>, String> {
    let state = state.clone();
    blocking(move || Ok(state.script_store()?.list_disabled_update_app_ids())).await
}

pub async fn get_script_depots(state: &AppState, app_id: String) -> Result<Vec<DepotInfo>, String> {
    let state = state.clone();
    blocking(move || {
        state
            .script_store()?
            .parse_depots(&app_id)
            .map_err(|e| format!("Failed to read depots for {}: {}", app_id, e))
    })
    .await
}
