//! Zip backups of per-user Steam data
//!
//! Entry names mirror the layout under the Steam root so a backup can be
//! restored by extracting it back onto that root.

use crate::archive::{join_relative, normalize_entry_path};
use crate::constants::files;
use crate::login_users::SteamUser;
use anyhow::{bail, Context, Result};
use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub path: PathBuf,
    pub files: usize,
}

/// `<accountId>_<kind>_backup_<yyyyMMdd_HHmmss>.zip`
fn backup_file_name(user: &SteamUser, kind: &str) -> String {
    format!(
        "{}_{}_backup_{}.zip",
        user.account_id,
        kind,
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Write `(entry name, source file)` pairs into a new zip.
fn write_backup(zip_path: &Path, sources: &[(String, PathBuf)]) -> Result<()> {
    let file = File::create(zip_path)
        .with_context(|| format!("Failed to create {}", zip_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, source) in sources {
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {}", name))?;
        let mut input = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;
        io::copy(&mut input, &mut zip).with_context(|| format!("Failed to write {}", name))?;
    }
    zip.finish().context("Failed to finish backup archive")?;
    Ok(())
}

/// Files directly inside `dir` whose name passes `keep`, sorted by name.
fn files_in(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(&keep))
        .map(|e| e.into_path())
        .collect()
}

fn backup_flat_dir(
    user: &SteamUser,
    out_dir: &Path,
    kind: &str,
    prefix: &str,
    found: Vec<PathBuf>,
) -> Result<BackupReport> {
    let sources: Vec<(String, PathBuf)> = found
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((format!("{}/{}", prefix, name), path))
        })
        .collect();

    let zip_path = out_dir.join(backup_file_name(user, kind));
    write_backup(&zip_path, &sources)?;
    info!(
        "[data_backup] {} backup created: {} ({} files)",
        kind,
        zip_path.display(),
        sources.len()
    );
    Ok(BackupReport {
        path: zip_path,
        files: sources.len(),
    })
}

/// Playtime lives in `userdata/<accountId>/config/localconfig.vdf`.
pub fn backup_playtime(steam_path: &Path, user: &SteamUser, out_dir: &Path) -> Result<BackupReport> {
    let entry = format!("userdata/{}/config/localconfig.vdf", user.account_id);
    let source = join_relative(steam_path, &entry);
    if !source.is_file() {
        bail!("localconfig.vdf not found at {}", source.display());
    }

    let zip_path = out_dir.join(backup_file_name(user, "playtime"));
    write_backup(&zip_path, &[(entry, source)])?;
    info!("[data_backup] Playtime backup created: {}", zip_path.display());
    Ok(BackupReport {
        path: zip_path,
        files: 1,
    })
}

/// `appcache/stats/UserGameStats_<accountId>_*.bin`
pub fn backup_achievements(steam_path: &Path, user: &SteamUser, out_dir: &Path) -> Result<BackupReport> {
    let stats = steam_path.join("appcache").join("stats");
    if !stats.is_dir() {
        bail!("Stats directory not found at {}", stats.display());
    }
    let prefix = format!("UserGameStats_{}_", user.account_id);
    let found = files_in(&stats, |name| name.starts_with(&prefix) && name.ends_with(".bin"));
    if found.is_empty() {
        bail!("No achievement files found for user {}", user.account_id);
    }
    backup_flat_dir(user, out_dir, "achievements", "appcache/stats", found)
}

/// Every depot script in `config/stplug-in`.
pub fn backup_added_games(steam_path: &Path, user: &SteamUser, out_dir: &Path) -> Result<BackupReport> {
    let plugin_dir = steam_path.join("config").join(files::STPLUGIN_DIR);
    if !plugin_dir.is_dir() {
        bail!("stplug-in directory not found at {}", plugin_dir.display());
    }
    let found = files_in(&plugin_dir, |name| name.to_ascii_lowercase().ends_with(".lua"));
    if found.is_empty() {
        bail!("No .lua files found in {}", plugin_dir.display());
    }
    let prefix = format!("config/{}", files::STPLUGIN_DIR);
    backup_flat_dir(user, out_dir, "st_games", &prefix, found)
}

/// Extract a backup onto the Steam root. Returns the number of files
/// restored; unsafe entry names are skipped.
pub fn restore_backup(steam_path: &Path, zip_path: &Path) -> Result<usize> {
    let file = File::open(zip_path)
        .with_context(|| format!("Backup file not found: {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("Not a valid backup archive")?;

    let mut restored = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(rel) = normalize_entry_path(entry.name()) else {
            warn!("[data_backup] Skipping unsafe entry '{}'", entry.name());
            continue;
        };

        let dest = join_relative(steam_path, &rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        io::copy(&mut entry, &mut out).with_context(|| format!("Failed to restore {}", rel))?;
        restored += 1;
    }

    info!("[data_backup] Restored {} files from {}", restored, zip_path.display());
    Ok(restored)
}
