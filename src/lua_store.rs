//! Per-game unlock scripts in Steam's `config/stplug-in` directory
//!
//! Active scripts are `<appid>.lua`, disabled ones `<appid>.lua.disabled`.
//! Update pinning is toggled by commenting `setManifestid` lines with a
//! two-character `--` prefix placed right after the line's indentation, so
//! toggling is exactly reversible.

use crate::constants::lua;
use crate::error::ScriptError;
use crate::lua_parser::{self, DepotInfo};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchResult {
    /// Marker present, nothing was commented out.
    UpdatesDisabledUnchanged,
    /// Marker present, previously commented pins were restored.
    UpdatesDisabledAndReEnabled,
    /// The script has no `setManifestid` directive at all.
    NoManifestMarker,
    Patched,
    NoChange,
}

#[derive(Debug, Clone)]
pub struct DepotScriptStore {
    dir: PathBuf,
}

fn split_indent(line: &str) -> (&str, &str) {
    let body = line.trim_start();
    line.split_at(line.len() - body.len())
}

fn is_pin(line: &str) -> bool {
    line.trim().starts_with(lua::MANIFEST_PIN)
}

fn is_commented_pin(line: &str) -> bool {
    line.trim()
        .strip_prefix(lua::COMMENT_PREFIX)
        .is_some_and(|rest| rest.starts_with(lua::MANIFEST_PIN))
}

fn comment_line(line: &str) -> String {
    let (indent, body) = split_indent(line);
    format!("{}{}{}", indent, lua::COMMENT_PREFIX, body)
}

fn uncomment_line(line: &str) -> String {
    let (indent, body) = split_indent(line);
    format!("{}{}", indent, &body[lua::COMMENT_PREFIX.len()..])
}

/// Comment every active pin. Returns true if anything changed.
fn comment_pins(lines: &mut [String]) -> bool {
    let mut changed = false;
    for line in lines.iter_mut().filter(|l| is_pin(l)) {
        *line = comment_line(line);
        changed = true;
    }
    changed
}

/// Restore every commented pin. Returns true if anything changed.
fn uncomment_pins(lines: &mut [String]) -> bool {
    let mut changed = false;
    for line in lines.iter_mut().filter(|l| is_commented_pin(l)) {
        *line = uncomment_line(line);
        changed = true;
    }
    changed
}

fn split_lines(content: &str) -> Vec<String> {
    content.split('\n').map(str::to_string).collect()
}

impl DepotScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn active_path(&self, app_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", app_id, lua::EXTENSION))
    }

    pub fn disabled_path(&self, app_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", app_id, lua::EXTENSION, lua::DISABLED_SUFFIX))
    }

    /// `(active, disabled)` scripts, sorted by path. A missing directory
    /// yields two empty lists.
    pub fn list_scripts(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ScriptError> {
        let mut active = Vec::new();
        let mut disabled = Vec::new();

        if !self.dir.is_dir() {
            return Ok((active, disabled));
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            ScriptError::io(format!("Error reading {}", self.dir.display()), e)
        })?;

        let disabled_ext = format!("{}{}", lua::EXTENSION, lua::DISABLED_SUFFIX);
        let reserved_disabled = format!("{}{}", lua::RESERVED_SCRIPT, lua::DISABLED_SUFFIX);

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let dots = name.matches('.').count();
            let lower = name.to_ascii_lowercase();

            if dots == 1 && name.ends_with(lua::EXTENSION) {
                let stem = &name[..name.len() - lua::EXTENSION.len()];
                if lower != lua::RESERVED_SCRIPT
                    && !stem.is_empty()
                    && stem.chars().all(|c| c.is_ascii_digit())
                {
                    active.push(path);
                }
            } else if dots == 2 && lower.ends_with(&disabled_ext) && lower != reserved_disabled {
                disabled.push(path);
            }
        }

        active.sort();
        disabled.sort();
        Ok((active, disabled))
    }

    /// File name minus the script extension and disabled suffix.
    pub fn extract_app_id(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
            .replace(lua::DISABLED_SUFFIX, "")
            .replace(lua::EXTENSION, "")
    }

    fn read(path: &Path) -> Result<String, ScriptError> {
        fs::read_to_string(path)
            .map_err(|e| ScriptError::io(format!("Error reading {}", path.display()), e))
    }

    fn write(path: &Path, lines: &[String]) -> Result<(), ScriptError> {
        fs::write(path, lines.join("\n"))
            .map_err(|e| ScriptError::io(format!("Error writing {}", path.display()), e))
    }

    /// Comment out manifest pins so the game follows the latest depot
    /// revision. Idempotent: a second call reports `NoChange`.
    pub fn patch(&self, path: &Path) -> Result<PatchResult, ScriptError> {
        let content = Self::read(path)?;
        let mut lines = split_lines(&content);

        if content.contains(lua::UPDATES_DISABLED_MARKER) {
            if uncomment_pins(&mut lines) {
                Self::write(path, &lines)?;
                return Ok(PatchResult::UpdatesDisabledAndReEnabled);
            }
            return Ok(PatchResult::UpdatesDisabledUnchanged);
        }

        if !content.contains(lua::MANIFEST_PIN) {
            return Ok(PatchResult::NoManifestMarker);
        }

        if comment_pins(&mut lines) {
            Self::write(path, &lines)?;
            debug!("[lua_store] Patched {}", path.display());
            return Ok(PatchResult::Patched);
        }
        Ok(PatchResult::NoChange)
    }

    fn rename(&self, from: PathBuf, to: PathBuf) -> Result<(), ScriptError> {
        if !from.is_file() {
            return Err(ScriptError::NotFound(from.display().to_string()));
        }
        if to.exists() {
            return Err(ScriptError::AlreadyExists(to.display().to_string()));
        }
        fs::rename(&from, &to)
            .map_err(|e| ScriptError::io(format!("Error renaming {}", from.display()), e))
    }

    pub fn disable(&self, app_id: &str) -> Result<(), ScriptError> {
        self.rename(self.active_path(app_id), self.disabled_path(app_id))?;
        info!("[lua_store] Disabled {}", app_id);
        Ok(())
    }

    pub fn enable(&self, app_id: &str) -> Result<(), ScriptError> {
        self.rename(self.disabled_path(app_id), self.active_path(app_id))?;
        info!("[lua_store] Enabled {}", app_id);
        Ok(())
    }

    /// Remove whichever form of the script exists.
    pub fn delete(&self, app_id: &str) -> Result<(), ScriptError> {
        let target = [self.active_path(app_id), self.disabled_path(app_id)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| ScriptError::NotFound(app_id.to_string()))?;

        fs::remove_file(&target)
            .map_err(|e| ScriptError::io(format!("Error deleting {}", target.display()), e))?;
        info!("[lua_store] Deleted {}", target.display());
        Ok(())
    }

    /// Pin the game to its current manifests: insert the marker and restore
    /// every commented `setManifestid` line.
    pub fn disable_auto_updates_for(&self, app_id: &str) -> Result<(), ScriptError> {
        let path = self.active_path(app_id);
        if !path.is_file() {
            return Err(ScriptError::NotFound(app_id.to_string()));
        }

        let content = Self::read(&path)?;
        if content.contains(lua::UPDATES_DISABLED_MARKER) {
            return Err(ScriptError::AlreadyDisabled(app_id.to_string()));
        }

        let mut lines = split_lines(&content);
        lines.insert(0, lua::UPDATES_DISABLED_MARKER.to_string());
        uncomment_pins(&mut lines);
        Self::write(&path, &lines)?;
        info!("[lua_store] Disabled updates for {}", app_id);
        Ok(())
    }

    /// Drop the marker and comment pins in one file. Returns whether the
    /// file was rewritten.
    fn enable_auto_updates_in(path: &Path) -> Result<bool, ScriptError> {
        let content = Self::read(path)?;
        let mut lines = split_lines(&content);

        let before = lines.len();
        lines.retain(|line| !line.contains(lua::UPDATES_DISABLED_MARKER));
        let removed_marker = lines.len() != before;
        let commented = comment_pins(&mut lines);

        if removed_marker || commented {
            Self::write(path, &lines)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn enable_auto_updates_for(&self, app_id: &str) -> Result<bool, ScriptError> {
        let path = self.active_path(app_id);
        if !path.is_file() {
            return Err(ScriptError::NotFound(app_id.to_string()));
        }
        Self::enable_auto_updates_in(&path)
    }

    /// Returns how many scripts were rewritten. Unreadable files are logged
    /// and skipped.
    pub fn enable_auto_updates_for_all(&self) -> Result<usize, ScriptError> {
        let (active, _) = self.list_scripts()?;
        let mut modified = 0;
        for path in &active {
            match Self::enable_auto_updates_in(path) {
                Ok(true) => modified += 1,
                Ok(false) => {}
                Err(e) => warn!("[lua_store] {}", e),
            }
        }
        info!(
            "[lua_store] Enabled auto-updates in {} of {} scripts",
            modified,
            active.len()
        );
        Ok(modified)
    }

    /// App ids whose active script carries the updates-disabled marker.
    pub fn list_disabled_update_app_ids(&self) -> Vec<String> {
        let Ok((active, _)) = self.list_scripts() else {
            return Vec::new();
        };
        active
            .iter()
            .filter(|path| {
                fs::read_to_string(path)
                    .map(|c| c.contains(lua::UPDATES_DISABLED_MARKER))
                    .unwrap_or(false)
            })
            .map(|path| Self::extract_app_id(path))
            .collect()
    }

    /// Depots declared by the app's script (active or disabled form).
    pub fn parse_depots(&self, app_id: &str) -> Result<Vec<DepotInfo>, ScriptError> {
        let path = [self.active_path(app_id), self.disabled_path(app_id)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| ScriptError::NotFound(app_id.to_string()))?;
        Ok(lua_parser::parse_depots_from_script(&Self::read(&path)?))
    }
}
