pub const APP_NAME: &str = "basement";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Network timeout for downloads and API calls. Never retried internally.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Offset between a SteamID64 and its 32-bit account id.
pub const STEAM_ID64_BASE: u64 = 76561197960265728;

pub mod files {
    pub const LIBRARY_FOLDERS_VDF: &str = "libraryfolders.vdf";
    pub const LOGIN_USERS_VDF: &str = "loginusers.vdf";
    pub const CONFIG_VDF: &str = "config.vdf";
    pub const STPLUGIN_DIR: &str = "stplug-in";
    pub const DEPOTCACHE_DIR: &str = "depotcache";
    pub const MANIFEST_EXTENSION: &str = ".manifest";
    pub const FIX_BACKUP_DIR: &str = "fixbackup";
    pub const FIX_HISTORY_JSON: &str = "fixhistory.json";
    pub const SETTINGS_JSON: &str = "settings.json";

    #[cfg(windows)]
    pub const STEAM_LAUNCHER: &str = "steam.exe";
    #[cfg(not(windows))]
    pub const STEAM_LAUNCHER: &str = "steam.sh";

    pub fn app_manifest(app_id: &str) -> String {
        format!("appmanifest_{}.acf", app_id)
    }

    pub fn fix_log(app_id: &str) -> String {
        format!("basement-fix-log-{}.log", app_id)
    }
}

pub mod lua {
    pub const EXTENSION: &str = ".lua";
    pub const DISABLED_SUFFIX: &str = ".disabled";
    pub const RESERVED_SCRIPT: &str = "steamtools.lua";
    pub const UPDATES_DISABLED_MARKER: &str = "-- LUATOOLS: UPDATES DISABLED!";
    pub const MANIFEST_PIN: &str = "setManifestid";
    /// Always exactly two characters so toggling never drifts.
    pub const COMMENT_PREFIX: &str = "--";
}

pub mod urls {
    pub const STORE_APP_DETAILS: &str = "https://store.steampowered.com/api/appdetails";
    /// Fix downloads have no default host; the template must be configured.
    pub const DEFAULT_FIX_BASE: &str = "";
    pub const DEFAULT_API_BASE: &str = "https://manifest.morrenus.xyz/api/v1";
}
