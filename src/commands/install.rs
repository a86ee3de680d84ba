//! Package install - drop depot scripts and manifests into Steam
//!
//! A package is a single `.lua` script, a single `.manifest` file, or a zip
//! (or 7z) holding any number of both. Scripts land in `config/stplug-in`,
//! manifests in `depotcache`, and depot keys found in the scripts are added
//! to `config.vdf`.

use super::{blocking, inject_keys_into, AppState};
use crate::archive::{normalize_entry_path, ArchiveSource};
use crate::config_vdf;
use crate::constants::{files, lua};
use crate::error::FixError;
use crate::lua_store::DepotScriptStore;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageReport {
    /// App ids of the scripts written.
    pub scripts: Vec<String>,
    /// File names of the manifests written.
    pub manifests: Vec<String>,
    pub keys_added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageFile {
    Script,
    Manifest,
}

fn classify(file_name: &str) -> Option<PackageFile> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(lua::EXTENSION) {
        Some(PackageFile::Script)
    } else if lower.ends_with(files::MANIFEST_EXTENSION) {
        Some(PackageFile::Manifest)
    } else {
        None
    }
}

/// `(kind, file name, bytes)` for every script and manifest in the package.
fn collect_files(package: &Path) -> Result<Vec<(PackageFile, String, Vec<u8>)>, String> {
    let file_name = package
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| format!("{} is not a file", package.display()))?;

    if let Some(kind) = classify(&file_name) {
        let bytes = fs::read(package)
            .map_err(|e| format!("Failed to read {}: {}", package.display(), e))?;
        return Ok(vec![(kind, file_name, bytes)]);
    }

    let source = ArchiveSource::open(package)
        .map_err(|e| format!("Unsupported file type {}: {}", file_name, e))?;
    let mut found = Vec::new();
    source
        .for_each_file(None, |name, data| {
            let Some(rel) = normalize_entry_path(name) else {
                warn!("[install] Skipping unsafe entry: {}", name);
                return Ok(true);
            };
            let base = rel.rsplit('/').next().unwrap_or(&rel).to_string();
            let Some(kind) = classify(&base) else {
                debug!("[install] Ignoring {}", rel);
                return Ok(true);
            };
            let mut bytes = Vec::new();
            data.read_to_end(&mut bytes)
                .map_err(|e| FixError::io(format!("Error reading {}", rel), e))?;
            found.push((kind, base, bytes));
            Ok(true)
        })
        .map_err(|e| format!("Failed to read {}: {}", file_name, e))?;

    if found.is_empty() {
        return Err(format!("No .lua or .manifest files found in {}", file_name));
    }
    Ok(found)
}

/// Install `package` under the Steam root. Nothing is written until the
/// whole package has been read.
pub fn install_package_into(steam_root: &Path, package: &Path) -> Result<PackageReport, String> {
    let found = collect_files(package)?;

    let store = DepotScriptStore::new(steam_root.join("config").join(files::STPLUGIN_DIR));
    let depotcache = steam_root.join(files::DEPOTCACHE_DIR);
    let mut report = PackageReport::default();
    let mut keys = BTreeMap::new();

    for (kind, name, bytes) in found {
        match kind {
            PackageFile::Script => {
                let app_id = name[..name.len() - lua::EXTENSION.len()].to_string();
                if app_id.is_empty() || name.eq_ignore_ascii_case(lua::RESERVED_SCRIPT) {
                    warn!("[install] Leaving {} untouched", name);
                    continue;
                }
                fs::create_dir_all(store.dir())
                    .map_err(|e| format!("Failed to create {}: {}", store.dir().display(), e))?;
                let target = store.active_path(&app_id);
                fs::write(&target, &bytes)
                    .map_err(|e| format!("Failed to write {}: {}", target.display(), e))?;

                // A stale disabled copy would shadow the fresh script on the next toggle.
                let disabled = store.disabled_path(&app_id);
                if disabled.is_file() {
                    fs::remove_file(&disabled)
                        .map_err(|e| format!("Failed to remove {}: {}", disabled.display(), e))?;
                }

                keys.extend(config_vdf::extract_keys_from_script(&String::from_utf8_lossy(&bytes)));
                info!("[install] Installed script for {}", app_id);
                report.scripts.push(app_id);
            }
            PackageFile::Manifest => {
                fs::create_dir_all(&depotcache)
                    .map_err(|e| format!("Failed to create {}: {}", depotcache.display(), e))?;
                let target = depotcache.join(&name);
                fs::write(&target, &bytes)
                    .map_err(|e| format!("Failed to write {}: {}", target.display(), e))?;
                info!("[install] Installed manifest {}", name);
                report.manifests.push(name);
            }
        }
    }

    if !keys.is_empty() {
        let keys: Vec<(String, String)> = keys.into_iter().collect();
        let config = steam_root.join("config").join(files::CONFIG_VDF);
        report.keys_added = inject_keys_into(&config, &keys)?;
    }
    Ok(report)
}

pub async fn install_package(state: &AppState, package: PathBuf) -> Result<PackageReport, String> {
    let state = state.clone();
    blocking(move || {
        let steam = state.steam_path()?;
        install_package_into(&steam, &package)
    })
    .await
}
