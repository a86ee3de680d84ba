//! Steam client process control

use log::{info, warn};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Time given to the client to exit before it is relaunched.
const RESTART_GRACE: Duration = Duration::from_secs(2);

pub fn is_steam_running() -> bool {
    #[cfg(windows)]
    {
        Command::new("tasklist")
            .args(["/FI", "IMAGENAME eq steam.exe", "/NH"])
            .output()
            .map(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .to_ascii_lowercase()
                    .contains("steam.exe")
            })
            .unwrap_or(false)
    }
    #[cfg(not(windows))]
    {
        Command::new("pgrep")
            .args(["-x", "steam"])
            .stdout(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

fn kill_steam() {
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/F", "/IM", "steam.exe"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    #[cfg(not(windows))]
    {
        let _ = Command::new("pkill")
            .args(["-x", "steam"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Stop the client if it is running and start it again from `launcher`.
pub fn restart_steam(launcher: &Path) -> Result<(), String> {
    if !launcher.is_file() {
        return Err(format!("Steam launcher not found at {}", launcher.display()));
    }

    if is_steam_running() {
        info!("[steam_process] Stopping Steam");
        kill_steam();
        std::thread::sleep(RESTART_GRACE);
        if is_steam_running() {
            warn!("[steam_process] Steam still running after kill request");
        }
    }

    info!("[steam_process] Launching {}", launcher.display());
    Command::new(launcher)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to start Steam: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_requires_launcher() {
        let dir = tempfile::tempdir().unwrap();
        let err = restart_steam(&dir.path().join("steam.sh")).unwrap_err();
        assert!(err.contains("not found"));
    }
}
