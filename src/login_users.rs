//! Logged-in Steam accounts (`config/loginusers.vdf`)
//!
//! Uses its own line scanner rather than the generic VDF tree: a user block
//! is recognised by its 17-digit SteamID64 key, and the file is re-read on
//! every call so external changes are always visible.

use crate::constants::{files, STEAM_ID64_BASE};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamUser {
    pub steam_id64: String,
    pub account_id: String,
    pub account_name: String,
    pub persona_name: String,
    pub is_most_recent: bool,
    pub timestamp: i64,
}

/// 32-bit account id (the `userdata/<id>` folder name).
pub fn steam_id64_to_account_id(steam_id64: u64) -> u64 {
    steam_id64.saturating_sub(STEAM_ID64_BASE)
}

fn quoted_tokens(line: &str) -> Vec<&str> {
    line.split('"').skip(1).step_by(2).collect()
}

/// Every user record in file order.
pub fn parse_login_users(content: &str) -> Vec<SteamUser> {
    let mut users: Vec<SteamUser> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('"') {
            continue;
        }
        let tokens = quoted_tokens(trimmed);
        let Some(&key) = tokens.first() else {
            continue;
        };

        if tokens.len() == 1 && key.len() == 17 && key.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = key.parse::<u64>() {
                users.push(SteamUser {
                    steam_id64: key.to_string(),
                    account_id: steam_id64_to_account_id(id).to_string(),
                    ..Default::default()
                });
            }
            continue;
        }

        let (Some(user), Some(&value)) = (users.last_mut(), tokens.get(1)) else {
            continue;
        };
        if key.eq_ignore_ascii_case("AccountName") {
            user.account_name = value.to_string();
        } else if key.eq_ignore_ascii_case("PersonaName") {
            user.persona_name = value.to_string();
        } else if key.eq_ignore_ascii_case("MostRecent") {
            user.is_most_recent = value == "1";
        } else if key.eq_ignore_ascii_case("Timestamp") {
            if let Ok(ts) = value.parse() {
                user.timestamp = ts;
            }
        }
    }

    users
}

/// Most-recent-flagged user, else the one with the newest timestamp.
pub fn select_current_user(users: Vec<SteamUser>) -> Option<SteamUser> {
    if let Some(idx) = users.iter().position(|u| u.is_most_recent) {
        return users.into_iter().nth(idx);
    }
    users.into_iter().max_by_key(|u| u.timestamp)
}

pub fn current_user(steam_path: &Path) -> Option<SteamUser> {
    let path = steam_path.join("config").join(files::LOGIN_USERS_VDF);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!("[login_users] Cannot read {}: {}", path.display(), e);
            return None;
        }
    };

    let user = select_current_user(parse_login_users(&content));
    match &user {
        Some(u) => info!(
            "[login_users] Current Steam user: {} (AccountId: {})",
            u.persona_name, u.account_id
        ),
        None => warn!("[login_users] No users found in {}", path.display()),
    }
    user
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_USERS: &str = r#""users"
{
	"76561198000000001"
	{
		"AccountName"		"alpha"
		"PersonaName"		"Alpha"
		"RememberPassword"		"1"
		"MostRecent"		"0"
		"Timestamp"		"100"
	}
	"76561198000000002"
	{
		"AccountName"		"beta"
		"PersonaName"		"Beta"
		"mostrecent"		"1"
		"Timestamp"		"50"
	}
}
"#;

    #[test]
    fn test_parse_records() {
        let users = parse_login_users(LOGIN_USERS);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].account_name, "alpha");
        assert_eq!(users[0].timestamp, 100);
        assert!(!users[0].is_most_recent);
        assert_eq!(users[1].persona_name, "Beta");
        assert!(users[1].is_most_recent);
    }

    #[test]
    fn test_account_id_derivation() {
        let users = parse_login_users(LOGIN_USERS);
        assert_eq!(users[0].account_id, "39734273");
    }

    #[test]
    fn test_most_recent_beats_timestamp() {
        let user = select_current_user(parse_login_users(LOGIN_USERS)).unwrap();
        assert_eq!(user.account_name, "beta");
    }

    #[test]
    fn test_falls_back_to_newest_timestamp() {
        let content = LOGIN_USERS.replace("\"mostrecent\"\t\t\"1\"", "\"mostrecent\"\t\t\"0\"");
        let user = select_current_user(parse_login_users(&content)).unwrap();
        assert_eq!(user.account_name, "alpha");
    }

    #[test]
    fn test_missing_or_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(current_user(dir.path()).is_none());

        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/loginusers.vdf"), "\"users\"\n{\n}\n").unwrap();
        assert!(current_user(dir.path()).is_none());
    }
}
