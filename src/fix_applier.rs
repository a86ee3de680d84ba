//! Apply and revert archive-based game fixes
//!
//! An apply snapshots every file it is about to overwrite into
//! `<install>/fixbackup/<timestamp>/`, writes the archive contents and then
//! appends a `[FIX]` block to the game's fix log. `unfix` reverses the most
//! recent block: backups are restored, files the fix created are deleted
//! and the block is dropped from the log.

use crate::archive::{common_base_path, join_relative, normalize_entry_path, ArchiveSource};
use crate::constants::{files, HTTP_TIMEOUT_SECS};
use crate::error::FixError;
use crate::fix_history::{FixHistoryEntry, FixHistoryStore};
use crate::fix_log::{FixLog, FixLogEntry, LogBlock, GENERIC_FIX};
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const BACKUP_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixState {
    Idle,
    /// Probing for encryption and verifying the password.
    PasswordCheck,
    /// Listing entries and planning destinations.
    Extracting,
    /// Snapshotting existing files, then writing the archive contents.
    BackingUp,
    WritingLog,
    Done,
    Failed,
}

/// The game a fix is applied to.
#[derive(Debug, Clone)]
pub struct FixTarget {
    pub app_id: String,
    pub install_path: PathBuf,
    pub game_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub files: Vec<String>,
    pub backed_up: Vec<String>,
    pub backup_path: PathBuf,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnfixOutcome {
    NothingToUndo,
    Reverted {
        game_name: String,
        fix_date: NaiveDateTime,
        restored: usize,
        deleted: usize,
    },
}

struct Progress<'a> {
    app_id: &'a str,
    state: FixState,
}

impl<'a> Progress<'a> {
    fn new(app_id: &'a str) -> Self {
        Self {
            app_id,
            state: FixState::Idle,
        }
    }

    fn advance(&mut self, next: FixState) {
        info!("[fix_applier] {}: {:?} -> {:?}", self.app_id, self.state, next);
        self.state = next;
    }
}

fn copy_creating_parents(from: &Path, to: &Path) -> Result<(), FixError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| FixError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    fs::copy(from, to).map_err(|e| {
        FixError::io(format!("Failed to copy {} to {}", from.display(), to.display()), e)
    })?;
    Ok(())
}

pub fn fix_log_path(install_path: &Path, app_id: &str) -> PathBuf {
    install_path.join(files::fix_log(app_id))
}

pub struct ArchiveFixEngine {
    history: FixHistoryStore,
}

impl ArchiveFixEngine {
    pub fn new(history: FixHistoryStore) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &FixHistoryStore {
        &self.history
    }

    /// Download `url` to a temporary file and apply it. No retries.
    pub fn apply_from_url<P>(
        &self,
        target: &FixTarget,
        url: &str,
        password_provider: P,
    ) -> Result<FixReport, FixError>
    where
        P: FnOnce() -> Option<String>,
    {
        info!("[fix_applier] Downloading fix for {} from {}", target.app_id, url);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| FixError::Network(e.to_string()))?;
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| FixError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FixError::Network(format!("HTTP {} from {}", response.status(), url)));
        }

        let mut temp = tempfile::NamedTempFile::new()
            .map_err(|e| FixError::io("Failed to create temp file", e))?;
        response
            .copy_to(&mut temp)
            .map_err(|e| FixError::Network(e.to_string()))?;
        temp.flush()
            .map_err(|e| FixError::io("Failed to write temp file", e))?;

        self.apply_from_file(temp.path(), target, url, password_provider)
    }

    /// Apply a local archive. `password_provider` is only asked when the
    /// archive is encrypted.
    pub fn apply_from_file<P>(
        &self,
        archive: &Path,
        target: &FixTarget,
        download_url: &str,
        password_provider: P,
    ) -> Result<FixReport, FixError>
    where
        P: FnOnce() -> Option<String>,
    {
        let mut progress = Progress::new(&target.app_id);
        let result = self.run_apply(&mut progress, archive, target, download_url, password_provider);
        match &result {
            Ok(report) => {
                progress.advance(FixState::Done);
                info!(
                    "[fix_applier] Applied fix to {}: {} files, {} backed up",
                    target.app_id,
                    report.files.len(),
                    report.backed_up.len()
                );
            }
            Err(e) => {
                error!("[fix_applier] Fix for {} failed: {}", target.app_id, e);
                progress.advance(FixState::Failed);
            }
        }
        result
    }

    fn run_apply<P>(
        &self,
        progress: &mut Progress,
        archive: &Path,
        target: &FixTarget,
        download_url: &str,
        password_provider: P,
    ) -> Result<FixReport, FixError>
    where
        P: FnOnce() -> Option<String>,
    {
        let install = target.install_path.as_path();
        let source = ArchiveSource::open(archive)?;

        progress.advance(FixState::PasswordCheck);
        let password = if source.is_encrypted()? {
            let pw = password_provider()
                .filter(|p| !p.is_empty())
                .ok_or(FixError::PasswordRequired)?;
            source.verify_password(&pw)?;
            Some(pw)
        } else {
            None
        };

        progress.advance(FixState::Extracting);
        let mut names = Vec::new();
        for entry in source.entries(password.as_deref())? {
            if entry.is_dir {
                continue;
            }
            match normalize_entry_path(&entry.name) {
                Some(name) => names.push(name),
                None => warn!("[fix_applier] Skipping unsafe entry '{}'", entry.name),
            }
        }

        let base = common_base_path(&names);
        if !base.is_empty() {
            info!("[fix_applier] Stripping common folder '{}'", base);
        }
        let mut plan: Vec<(String, String)> = Vec::new();
        for name in names {
            let rel = name.strip_prefix(base.as_str()).unwrap_or(&name).to_string();
            if !rel.is_empty() {
                plan.push((name, rel));
            }
        }
        if plan.is_empty() {
            return Err(FixError::Archive("archive contains no files".to_string()));
        }

        progress.advance(FixState::BackingUp);
        let now = Local::now().naive_local();
        let backup_dir = reserve_backup_dir(
            &install.join(files::FIX_BACKUP_DIR),
            &now.format(BACKUP_STAMP_FORMAT).to_string(),
        )?;

        let mut backed_up = Vec::new();
        let mut seen = HashSet::new();
        for (_, rel) in &plan {
            let dest = join_relative(install, rel);
            if dest.is_file() && seen.insert(rel.as_str()) {
                copy_creating_parents(&dest, &join_relative(&backup_dir, rel))?;
                backed_up.push(rel.clone());
            }
        }

        let destinations: HashMap<&str, &str> =
            plan.iter().map(|(name, rel)| (name.as_str(), rel.as_str())).collect();
        let mut written = Vec::new();
        let mut seen = HashSet::new();
        source.for_each_file(password.as_deref(), |name, reader| {
            let Some(rel) = normalize_entry_path(name)
                .as_deref()
                .and_then(|n| destinations.get(n).copied())
            else {
                return Ok(true);
            };
            let dest = join_relative(install, rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| FixError::io(format!("Failed to create {}", parent.display()), e))?;
            }
            let mut out = File::create(&dest)
                .map_err(|e| FixError::io(format!("Failed to create {}", dest.display()), e))?;
            io::copy(reader, &mut out)
                .map_err(|e| FixError::io(format!("Failed to extract {}", rel), e))?;
            if seen.insert(rel.to_string()) {
                written.push(rel.to_string());
            }
            Ok(true)
        })?;

        progress.advance(FixState::WritingLog);
        let entry = FixLogEntry {
            date: now,
            game_name: target.game_name.clone(),
            fix_type: GENERIC_FIX.to_string(),
            download_url: download_url.to_string(),
            backup_path: backup_dir.display().to_string(),
            files: written.clone(),
            backed_up: backed_up.clone(),
        };
        let log_path = fix_log_path(install, &target.app_id);
        append_log_entry(&log_path, &entry)?;

        if let Err(e) = self.history.add(FixHistoryEntry {
            app_id: target.app_id.clone(),
            game_name: target.game_name.clone(),
            install_path: install.display().to_string(),
            fix_date: now,
        }) {
            warn!("[fix_applier] Could not record fix history: {}", e);
        }

        Ok(FixReport {
            files: written,
            backed_up,
            backup_path: backup_dir,
            log_path,
        })
    }

    /// Revert the most recent fix recorded in the game's log.
    pub fn unfix(&self, app_id: &str, install_path: &Path) -> Result<UnfixOutcome, FixError> {
        let log_path = fix_log_path(install_path, app_id);
        let content = match fs::read_to_string(&log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("[fix_applier] No fix log for {}", app_id);
                return Ok(UnfixOutcome::NothingToUndo);
            }
            Err(e) => return Err(FixError::io(format!("Failed to read {}", log_path.display()), e)),
        };

        let mut log = FixLog::parse(&content);
        let Some(LogBlock::Fix(entry)) = log.latest_index().and_then(|i| log.remove(i)) else {
            info!("[fix_applier] Fix log for {} has nothing to undo", app_id);
            return Ok(UnfixOutcome::NothingToUndo);
        };
        info!(
            "[fix_applier] Reverting fix for {} from {}",
            app_id,
            entry.date.format(crate::fix_log::DATE_FORMAT)
        );

        let backup_dir = PathBuf::from(&entry.backup_path);
        let backed_up: HashSet<&str> = entry.backed_up.iter().map(String::as_str).collect();
        let mut restored = 0;
        let mut deleted = 0;

        for rel in &entry.backed_up {
            let backup = join_relative(&backup_dir, rel);
            if backup.is_file() {
                copy_creating_parents(&backup, &join_relative(install_path, rel))?;
                restored += 1;
            } else {
                warn!("[fix_applier] Backup missing for {}", rel);
            }
        }

        for rel in entry.files.iter().filter(|f| !backed_up.contains(f.as_str())) {
            let dest = join_relative(install_path, rel);
            if dest.is_file() {
                fs::remove_file(&dest)
                    .map_err(|e| FixError::io(format!("Failed to delete {}", dest.display()), e))?;
                deleted += 1;
            }
        }

        if log.is_empty() {
            fs::remove_file(&log_path)
                .map_err(|e| FixError::io(format!("Failed to delete {}", log_path.display()), e))?;
        } else {
            fs::write(&log_path, log.render())
                .map_err(|e| FixError::io(format!("Failed to write {}", log_path.display()), e))?;
        }

        remove_backup_dir(&backup_dir);

        if let Err(e) = self.history.remove(app_id) {
            warn!("[fix_applier] Could not update fix history: {}", e);
        }

        Ok(UnfixOutcome::Reverted {
            game_name: entry.game_name,
            fix_date: entry.date,
            restored,
            deleted,
        })
    }
}

/// Append one block, with a blank separator line when the log already has
/// content.
fn append_log_entry(log_path: &Path, entry: &FixLogEntry) -> Result<(), FixError> {
    let mut content = match fs::read_to_string(log_path) {
        Ok(existing) => existing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(FixError::io(format!("Failed to read {}", log_path.display()), e)),
    };
    if !content.trim().is_empty() {
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');
    } else {
        content.clear();
    }
    content.push_str(&crate::fix_log::render_entry(entry));

    fs::write(log_path, content)
        .map_err(|e| FixError::io(format!("Failed to write {}", log_path.display()), e))
}

/// Create a fresh backup folder named after `stamp`. A folder left by an
/// apply in the same second gets a `_N` suffix instead of being shared.
fn reserve_backup_dir(root: &Path, stamp: &str) -> Result<PathBuf, FixError> {
    fs::create_dir_all(root)
        .map_err(|e| FixError::io(format!("Failed to create {}", root.display()), e))?;

    let mut candidate = root.join(stamp);
    let mut suffix = 1;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{}_{}", stamp, suffix));
                suffix += 1;
            }
            Err(e) => {
                return Err(FixError::io(format!("Failed to create {}", candidate.display()), e))
            }
        }
    }
}

fn remove_backup_dir(backup_dir: &Path) {
    if backup_dir.is_dir() {
        if let Err(e) = fs::remove_dir_all(backup_dir) {
            warn!("[fix_applier] Could not delete {}: {}", backup_dir.display(), e);
            return;
        }
    }
    // Only the shared fixbackup folder, and only once empty.
    if let Some(parent) = backup_dir.parent() {
        if parent.file_name().is_some_and(|n| n == files::FIX_BACKUP_DIR) {
            let _ = fs::remove_dir(parent);
        }
    }
}

/// Expand a fix URL template. `{appid}` is matched case-insensitively.
pub fn fix_url(template: &str, app_id: &str) -> Option<String> {
    static APP_ID: OnceLock<Regex> = OnceLock::new();
    let template = template.trim();
    if template.is_empty() {
        return None;
    }
    let re = APP_ID.get_or_init(|| Regex::new(r"(?i)\{appid\}").expect("valid regex"));
    Some(re.replace_all(template, NoExpand(app_id)).into_owned())
}

/// HEAD request; any failure counts as "no fix".
pub fn check_for_fix(url: &str) -> bool {
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("[fix_applier] HTTP client error: {}", e);
            return false;
        }
    };
    match client.head(url).send() {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            info!("[fix_applier] No fix at {}: {}", url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{write_7z, write_zip};

    fn setup() -> (tempfile::TempDir, ArchiveFixEngine, FixTarget) {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("game");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::write(install.join("bin/game.dll"), b"original dll").unwrap();
        fs::write(install.join("readme.txt"), b"keep me").unwrap();

        let engine = ArchiveFixEngine::new(FixHistoryStore::new(dir.path().join("history.json")));
        let target = FixTarget {
            app_id: "400".to_string(),
            install_path: install,
            game_name: "Half-Life 2".to_string(),
        };
        (dir, engine, target)
    }

    #[test]
    fn test_fix_url_template() {
        assert_eq!(
            fix_url("https://fixes.invalid/{AppId}.zip", "400").as_deref(),
            Some("https://fixes.invalid/400.zip")
        );
        assert_eq!(fix_url("  ", "400"), None);
    }

    #[test]
    fn test_apply_strips_common_folder_and_backs_up() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("fix.zip");
        write_zip(
            &archive,
            &[
                ("Fix/", None),
                ("Fix/bin/game.dll", Some(b"patched dll")),
                ("Fix/bin/extra.dll", Some(b"new")),
                ("Fix/fix_readme.txt", Some(b"notes")),
            ],
            None,
        );

        let report = engine
            .apply_from_file(&archive, &target, "local file", || None)
            .unwrap();

        let install = &target.install_path;
        assert_eq!(fs::read(install.join("bin/game.dll")).unwrap(), b"patched dll");
        assert_eq!(fs::read(install.join("bin/extra.dll")).unwrap(), b"new");
        assert_eq!(fs::read(install.join("fix_readme.txt")).unwrap(), b"notes");
        assert_eq!(report.backed_up, vec!["bin/game.dll".to_string()]);
        assert_eq!(
            fs::read(report.backup_path.join("bin").join("game.dll")).unwrap(),
            b"original dll"
        );

        let log = fs::read_to_string(&report.log_path).unwrap();
        assert!(log.contains("Game: Half-Life 2"));
        assert!(log.contains("Download URL: local file"));
        assert_eq!(engine.history().load_all()[0].app_id, "400");
    }

    #[test]
    fn test_apply_then_unfix_restores_everything() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("fix.zip");
        write_zip(
            &archive,
            &[("bin/game.dll", Some(b"patched")), ("new/cfg.ini", Some(b"x=1"))],
            None,
        );

        engine.apply_from_file(&archive, &target, "local file", || None).unwrap();
        let outcome = engine.unfix(&target.app_id, &target.install_path).unwrap();

        let install = &target.install_path;
        assert!(matches!(outcome, UnfixOutcome::Reverted { restored: 1, deleted: 1, .. }));
        assert_eq!(fs::read(install.join("bin/game.dll")).unwrap(), b"original dll");
        assert_eq!(fs::read(install.join("readme.txt")).unwrap(), b"keep me");
        assert!(!install.join("new/cfg.ini").exists());
        assert!(!fix_log_path(install, "400").exists());
        assert!(!install.join(files::FIX_BACKUP_DIR).exists());
        assert!(engine.history().load_all().is_empty());
    }

    #[test]
    fn test_shared_folder_prefix_goes_deeper_than_one_level() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("fix.zip");
        write_zip(
            &archive,
            &[("Fix/bin/game.dll", Some(b"patched dll")), ("Fix/bin/extra.dll", Some(b"new"))],
            None,
        );

        let report = engine
            .apply_from_file(&archive, &target, "local file", || None)
            .unwrap();
        assert_eq!(report.files, vec!["game.dll".to_string(), "extra.dll".to_string()]);
        assert_eq!(fs::read(target.install_path.join("game.dll")).unwrap(), b"patched dll");
        assert_eq!(fs::read(target.install_path.join("bin/game.dll")).unwrap(), b"original dll");
    }

    #[test]
    fn test_back_to_back_applies_keep_separate_backups() {
        let (dir, engine, target) = setup();
        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        write_zip(&first, &[("bin/game.dll", Some(b"fix one"))], None);
        write_zip(&second, &[("bin/game.dll", Some(b"fix two"))], None);

        let one = engine.apply_from_file(&first, &target, "local file", || None).unwrap();
        let two = engine.apply_from_file(&second, &target, "local file", || None).unwrap();
        assert_ne!(one.backup_path, two.backup_path);

        let dll = target.install_path.join("bin/game.dll");
        engine.unfix("400", &target.install_path).unwrap();
        assert_eq!(fs::read(&dll).unwrap(), b"fix one");
        engine.unfix("400", &target.install_path).unwrap();
        assert_eq!(fs::read(&dll).unwrap(), b"original dll");
        assert!(!target.install_path.join(files::FIX_BACKUP_DIR).exists());
    }

    #[test]
    fn test_reserve_backup_dir_adds_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(files::FIX_BACKUP_DIR);
        let a = reserve_backup_dir(&root, "20240101120000").unwrap();
        let b = reserve_backup_dir(&root, "20240101120000").unwrap();
        let c = reserve_backup_dir(&root, "20240101120000").unwrap();
        assert_eq!(a, root.join("20240101120000"));
        assert_eq!(b, root.join("20240101120000_1"));
        assert_eq!(c, root.join("20240101120000_2"));
        assert!(a.is_dir() && b.is_dir() && c.is_dir());
    }

    #[test]
    fn test_unfix_keeps_earlier_blocks() {
        let (dir, engine, target) = setup();
        let log_path = fix_log_path(&target.install_path, "400");
        let earlier = FixLogEntry {
            date: NaiveDateTime::parse_from_str("2020-01-01 00:00:00", crate::fix_log::DATE_FORMAT)
                .unwrap(),
            game_name: "Half-Life 2".to_string(),
            fix_type: GENERIC_FIX.to_string(),
            download_url: "old".to_string(),
            backup_path: "gone".to_string(),
            files: vec!["old.txt".to_string()],
            backed_up: Vec::new(),
        };
        let before = crate::fix_log::render_entry(&earlier);
        fs::write(&log_path, &before).unwrap();

        let archive = dir.path().join("fix.zip");
        write_zip(&archive, &[("a.txt", Some(b"a"))], None);
        engine.apply_from_file(&archive, &target, "local file", || None).unwrap();
        engine.unfix("400", &target.install_path).unwrap();

        assert_eq!(fs::read_to_string(&log_path).unwrap(), before);
    }

    #[test]
    fn test_unfix_without_log() {
        let (_dir, engine, target) = setup();
        assert_eq!(
            engine.unfix("400", &target.install_path).unwrap(),
            UnfixOutcome::NothingToUndo
        );
    }

    #[test]
    fn test_password_errors_are_distinct() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("locked.zip");
        write_zip(&archive, &[("bin/game.dll", Some(b"patched"))], Some("pw"));

        let missing = engine.apply_from_file(&archive, &target, "local file", || None);
        assert!(matches!(missing, Err(FixError::PasswordRequired)));

        let wrong = engine.apply_from_file(&archive, &target, "local file", || Some("nope".into()));
        assert!(matches!(wrong, Err(FixError::InvalidPassword)));
        assert_eq!(fs::read(target.install_path.join("bin/game.dll")).unwrap(), b"original dll");

        engine
            .apply_from_file(&archive, &target, "local file", || Some("pw".into()))
            .unwrap();
        assert_eq!(fs::read(target.install_path.join("bin/game.dll")).unwrap(), b"patched");
    }

    #[test]
    fn test_encrypted_7z_fix_applies_and_reverts() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("fix.7z");
        write_7z(
            &archive,
            &[("Fix/bin/game.dll", b"patched"), ("Fix/steam_api.dll", b"emu")],
            Some("pw"),
            true,
        );

        let missing = engine.apply_from_file(&archive, &target, "local file", || None);
        assert!(matches!(missing, Err(FixError::PasswordRequired)));

        let report = engine
            .apply_from_file(&archive, &target, "local file", || Some("pw".into()))
            .unwrap();
        assert_eq!(report.backed_up, vec!["bin/game.dll".to_string()]);
        assert_eq!(fs::read(target.install_path.join("bin/game.dll")).unwrap(), b"patched");
        assert_eq!(fs::read(target.install_path.join("steam_api.dll")).unwrap(), b"emu");

        engine.unfix("400", &target.install_path).unwrap();
        assert_eq!(fs::read(target.install_path.join("bin/game.dll")).unwrap(), b"original dll");
        assert!(!target.install_path.join("steam_api.dll").exists());
    }

    #[test]
    fn test_traversal_entries_are_skipped() {
        let (dir, engine, target) = setup();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", Some(b"x")), ("ok.txt", Some(b"y"))], None);

        let report = engine.apply_from_file(&archive, &target, "local file", || None).unwrap();
        assert_eq!(report.files, vec!["ok.txt".to_string()]);
        assert!(!dir.path().join("escape.txt").exists());
    }
}
