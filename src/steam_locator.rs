//! Steam installation discovery and library folder enumeration

use crate::constants::files;
use crate::vdf;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Owns the detected Steam root for the lifetime of the process.
///
/// Create one and share it by reference; detection runs once and the result
/// stays cached until a validated custom path replaces it.
#[derive(Debug, Default)]
pub struct SteamLocator {
    cached: Mutex<Option<PathBuf>>,
}

impl SteamLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator seeded with a user-supplied path. The path is ignored unless
    /// it validates, in which case normal detection is skipped.
    pub fn with_custom_path(path: Option<&str>) -> Self {
        let locator = Self::new();
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            let expanded = shellexpand::tilde(path.trim()).to_string();
            if !locator.set_custom_path(Path::new(&expanded)) {
                warn!("[steam_locator] Ignoring invalid custom Steam path: {}", expanded);
            }
        }
        locator
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Detect the Steam root: registry first, then well-known directories.
    pub fn locate(&self) -> Option<PathBuf> {
        let mut cache = self.cache();
        if let Some(path) = cache.as_ref() {
            return Some(path.clone());
        }

        let found = registry_install_path().or_else(|| {
            candidate_dirs()
                .into_iter()
                .find(|dir| Self::validate_steam_path(dir))
        });

        match &found {
            Some(path) => info!("[steam_locator] Steam found at {}", path.display()),
            None => warn!("[steam_locator] Steam installation not detected"),
        }
        *cache = found.clone();
        found
    }

    /// Directory exists and contains the platform launcher.
    pub fn validate_steam_path(path: &Path) -> bool {
        path.is_dir() && path.join(files::STEAM_LAUNCHER).is_file()
    }

    /// Replace the cached root. Returns false (and changes nothing) when the
    /// path does not validate.
    pub fn set_custom_path(&self, path: &Path) -> bool {
        if !Self::validate_steam_path(path) {
            return false;
        }
        info!("[steam_locator] Using custom Steam path {}", path.display());
        *self.cache() = Some(path.to_path_buf());
        true
    }

    /// Primary Steam path plus every existing library folder listed in
    /// `libraryfolders.vdf`, de-duplicated in first-seen order.
    pub fn list_library_folders(steam_path: &Path) -> Vec<PathBuf> {
        let mut folders = vec![steam_path.to_path_buf()];

        let mut vdf_path = steam_path.join("steamapps").join(files::LIBRARY_FOLDERS_VDF);
        if !vdf_path.is_file() {
            vdf_path = steam_path.join("config").join(files::LIBRARY_FOLDERS_VDF);
        }
        if !vdf_path.is_file() {
            return folders;
        }

        let root = match vdf::parse_file(&vdf_path) {
            Ok(root) => root,
            Err(e) => {
                warn!("[steam_locator] Could not parse {}: {}", vdf_path.display(), e);
                return folders;
            }
        };

        if let Some(libraries) = root.get_object("libraryfolders") {
            for i in 0..10 {
                let Some(path) = libraries
                    .get_object(&i.to_string())
                    .and_then(|entry| entry.get_value("path"))
                else {
                    continue;
                };
                let path = PathBuf::from(path);
                if path.is_dir() && !folders.contains(&path) {
                    folders.push(path);
                }
            }
        }

        folders
    }

    /// `<library>/steamapps/common/<installdir>` for the first library that
    /// has a manifest for `app_id`.
    pub fn resolve_install_path_in(folders: &[PathBuf], app_id: &str) -> Option<PathBuf> {
        for folder in folders {
            let steamapps = folder.join("steamapps");
            let manifest = steamapps.join(files::app_manifest(app_id));
            if !manifest.is_file() {
                continue;
            }

            match vdf::parse_file(&manifest) {
                Ok(root) => {
                    let install_dir = root
                        .get_object("AppState")
                        .and_then(|state| state.get_value("installdir"))
                        .filter(|dir| !dir.is_empty());
                    if let Some(dir) = install_dir {
                        return Some(steamapps.join("common").join(dir));
                    }
                }
                Err(e) => debug!("[steam_locator] Skipping {}: {}", manifest.display(), e),
            }
        }
        None
    }

    pub fn resolve_install_path(&self, app_id: &str) -> Option<PathBuf> {
        let steam = self.locate()?;
        Self::resolve_install_path_in(&Self::list_library_folders(&steam), app_id)
    }

    pub fn library_folders(&self) -> Vec<PathBuf> {
        self.locate()
            .map(|steam| Self::list_library_folders(&steam))
            .unwrap_or_default()
    }

    pub fn stplugin_path(&self) -> Option<PathBuf> {
        self.locate()
            .map(|steam| steam.join("config").join(files::STPLUGIN_DIR))
    }

    pub fn ensure_stplugin_dir(&self) -> bool {
        match self.stplugin_path() {
            Some(path) => std::fs::create_dir_all(&path).is_ok(),
            None => false,
        }
    }

    pub fn config_vdf_path(&self) -> Option<PathBuf> {
        self.locate()
            .map(|steam| steam.join("config").join(files::CONFIG_VDF))
    }

    pub fn launcher_path(&self) -> Option<PathBuf> {
        self.locate().map(|steam| steam.join(files::STEAM_LAUNCHER))
    }
}

#[cfg(windows)]
fn registry_install_path() -> Option<PathBuf> {
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY, KEY_WOW64_64KEY};
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let lookups = [
        (r"SOFTWARE\WOW6432Node\Valve\Steam", KEY_READ | KEY_WOW64_64KEY),
        (r"SOFTWARE\Valve\Steam", KEY_READ | KEY_WOW64_32KEY),
    ];

    for (subkey, flags) in lookups {
        match hklm.open_subkey_with_flags(subkey, flags) {
            Ok(key) => {
                if let Ok(path) = key.get_value::<String, _>("InstallPath") {
                    let path = PathBuf::from(path);
                    if path.is_dir() {
                        return Some(path);
                    }
                }
            }
            Err(e) => debug!("[steam_locator] Registry key {} unavailable: {}", subkey, e),
        }
    }
    None
}

#[cfg(not(windows))]
fn registry_install_path() -> Option<PathBuf> {
    None
}

#[cfg(windows)]
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from(r"C:\Program Files (x86)\Steam"),
        PathBuf::from(r"C:\Program Files\Steam"),
    ];
    for var in ["ProgramFiles(x86)", "ProgramFiles"] {
        if let Some(base) = std::env::var_os(var) {
            dirs.push(PathBuf::from(base).join("Steam"));
        }
    }
    dirs
}

#[cfg(not(windows))]
fn candidate_dirs() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    if cfg!(target_os = "macos") {
        return vec![home.join("Library/Application Support/Steam")];
    }
    vec![
        home.join(".steam/steam"),
        home.join(".local/share/Steam"),
        home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"),
    ]
}
