//! Depot key commands - read, inject and upload `config.vdf` keys

use super::{blocking, AppState};
use crate::api::{self, KeysUploadOutcome};
use crate::config_vdf::{self, KeyExtraction};
use crate::lua_store::DepotScriptStore;
use log::info;
use std::io;
use std::path::Path;

pub async fn extract_config_keys(
    state: &AppState,
    filter_after: Option<String>,
) -> Result<KeyExtraction, String> {
    let state = state.clone();
    blocking(move || {
        let config = state
            .locator
            .config_vdf_path()
            .ok_or("Steam installation not found")?;
        Ok(config_vdf::extract_keys(&config, filter_after.as_deref()))
    })
    .await
}

/// Add keys to `config.vdf`, keeping any key Steam already has. Returns the
/// number of depots added.
pub fn inject_keys_into(config_path: &Path, keys: &[(String, String)]) -> Result<usize, String> {
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(format!("Failed to read {}: {}", config_path.display(), e)),
    };
    let before = config_vdf::extract_keys_from_str(&content, None).keys.len();

    let updated = config_vdf::add_decryption_keys(&content, keys)
        .map_err(|e| format!("Failed to update config.vdf: {}", e))?;
    if updated == content {
        return Ok(0);
    }

    std::fs::write(config_path, &updated)
        .map_err(|e| format!("Failed to write config.vdf: {}", e))?;
    let added = config_vdf::extract_keys_from_str(&updated, None)
        .keys
        .len()
        .saturating_sub(before);
    info!("[keys] Updated config.vdf with {} depot keys", added);
    Ok(added)
}

/// Copy the depot keys embedded in an app's script into `config.vdf`.
pub async fn inject_script_keys(state: &AppState, app_id: String) -> Result<usize, String> {
    let state = state.clone();
    blocking(move || {
        let store = state.script_store()?;
        let script = [store.active_path(&app_id), store.disabled_path(&app_id)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| format!("No script found for {}", app_id))?;
        let content = std::fs::read_to_string(&script)
            .map_err(|e| format!("Failed to read {}: {}", script.display(), e))?;

        let keys: Vec<(String, String)> = config_vdf::extract_keys_from_script(&content)
            .into_iter()
            .collect();
        if keys.is_empty() {
            info!(
                "[keys] {} has no depot keys",
                DepotScriptStore::extract_app_id(&script)
            );
            return Ok(0);
        }

        let config = state
            .locator
            .config_vdf_path()
            .ok_or("Steam installation not found")?;
        inject_keys_into(&config, &keys)
    })
    .await
}

/// Upload keys the key service does not have yet. `force` skips the
/// enabled flag and the minimum interval.
pub async fn upload_config_keys(state: &AppState, force: bool) -> Result<KeysUploadOutcome, String> {
    let config = {
        let state = state.clone();
        blocking(move || {
            state
                .locator
                .config_vdf_path()
                .ok_or_else(|| "Steam installation not found".to_string())
        })
        .await?
    };

    let mut settings = state.settings();
    let outcome = api::upload_new_config_keys(&mut settings, &config, force)
        .await
        .map_err(|e| format!("Config keys upload failed: {}", e))?;

    if matches!(outcome, KeysUploadOutcome::Uploaded { .. }) {
        settings.save_to(&state.settings_path)?;
    }
    Ok(outcome)
}
