//! Depot metadata extraction from unlock scripts
//!
//! Recognised call forms:
//! - `addappid(285311, 1, "hash") -- Depot name`
//! - `addtoken(3282720, "186020997252537705")`
//! - `setManifestid(285311, "2914580416607481530", 856171654)`

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotInfo {
    pub depot_id: String,
    pub name: String,
    pub size: u64,
    pub is_token_based: bool,
}

/// How many lines after a DLC section comment may hold its `addtoken` call.
const DLC_TOKEN_LOOKAHEAD: usize = 4;

struct Patterns {
    token: Regex,
    dlc_comment: Regex,
    add_app_id: Regex,
    set_manifest: Regex,
    depot_key: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        token: Regex::new(r"addtoken\((\d+)").expect("valid regex"),
        dlc_comment: Regex::new(r"--.*\(AppID:\s*(\d+)\)").expect("valid regex"),
        add_app_id: Regex::new(r"addappid\((\d+)(?:,.*?)?\)\s*--\s*(.+)").expect("valid regex"),
        set_manifest: Regex::new(r#"setManifestid\((\d+),\s*"[^"]*",\s*(\d+)\)"#)
            .expect("valid regex"),
        depot_key: Regex::new(r#"addappid\((\d+),\s*\d+,\s*"([^"]*)""#).expect("valid regex"),
    })
}

fn token_id(line: &str) -> Option<&str> {
    patterns()
        .token
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// App ids that are granted through `addtoken` rather than a depot key.
pub fn parse_token_app_ids(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| token_id(line.trim()))
        .map(str::to_string)
        .collect()
}

/// Merge the `addappid` pass (names) with the `setManifestid` pass (sizes).
/// Output keeps first-seen order.
pub fn parse_depots_from_script(content: &str) -> Vec<DepotInfo> {
    let p = patterns();
    let lines: Vec<&str> = content.lines().collect();
    let token_ids = parse_token_app_ids(content);

    let mut depots: Vec<DepotInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut current_dlc: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if let Some(caps) = p.dlc_comment.captures(trimmed) {
            let dlc_id = &caps[1];
            let end = (i + 1 + DLC_TOKEN_LOOKAHEAD).min(lines.len());
            current_dlc = lines[i + 1..end]
                .iter()
                .any(|next| token_id(next.trim()) == Some(dlc_id))
                .then(|| dlc_id.to_string());
            continue;
        }

        if let Some(caps) = p.add_app_id.captures(trimmed) {
            let depot_id = caps[1].to_string();
            if index.contains_key(&depot_id) {
                continue;
            }
            let is_token_based = token_ids.contains(&depot_id)
                || current_dlc
                    .as_ref()
                    .is_some_and(|dlc| token_ids.contains(dlc));

            index.insert(depot_id.clone(), depots.len());
            depots.push(DepotInfo {
                depot_id,
                name: caps[2].trim().to_string(),
                size: 0,
                is_token_based,
            });
        }
    }

    for line in &lines {
        let Some(caps) = p.set_manifest.captures(line.trim()) else {
            continue;
        };
        let depot_id = caps[1].to_string();
        let size: u64 = caps[2].parse().unwrap_or(0);

        match index.get(&depot_id) {
            Some(&idx) => depots[idx].size = size,
            None => {
                index.insert(depot_id.clone(), depots.len());
                depots.push(DepotInfo {
                    name: format!("Depot {}", depot_id),
                    is_token_based: token_ids.contains(&depot_id),
                    depot_id,
                    size,
                });
            }
        }
    }

    depots
}

/// `(depot_id, key)` pairs from `addappid(id, flag, "key")` calls.
pub fn parse_depot_keys(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| patterns().depot_key.captures(line.trim()))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .filter(|(_, key)| !key.is_empty())
        .collect()
}

pub fn parse_depots_from_file(path: &Path) -> std::io::Result<Vec<DepotInfo>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_depots_from_script(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_depot_merges_name_and_size() {
        let script = "addappid(400, 1, \"hash\") -- Half-Life 2\nsetManifestid(400, \"123\", 1000)\n";
        let depots = parse_depots_from_script(script);
        assert_eq!(
            depots,
            vec![DepotInfo {
                depot_id: "400".to_string(),
                name: "Half-Life 2".to_string(),
                size: 1000,
                is_token_based: false,
            }]
        );
    }

    #[test]
    fn test_manifest_only_depot_gets_placeholder_name() {
        let depots = parse_depots_from_script("setManifestid(228988, \"55\", 42)\n");
        assert_eq!(depots.len(), 1);
        assert_eq!(depots[0].name, "Depot 228988");
        assert_eq!(depots[0].size, 42);
    }

    #[test]
    fn test_commented_pins_still_report_size() {
        let script = "addappid(401) -- Content\n--setManifestid(401, \"9\", 77)\n";
        assert_eq!(parse_depots_from_script(script)[0].size, 77);
    }

    #[test]
    fn test_token_ids() {
        let ids = parse_token_app_ids("addtoken(3282720, \"1860\")\naddappid(1)\n  addtoken(55,\"x\")");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("3282720"));
        assert!(ids.contains("55"));
    }

    #[test]
    fn test_dlc_section_propagates_token_flag() {
        let script = r#"addappid(3282710, 1, "a") -- Base Game
-- SILENT HILL f - Bonus Content (AppID: 3282720)
addappid(3282720)
addtoken(3282720, "186020997252537705")
addappid(3282721, 1, "b") -- Bonus Depot
"#;
        let depots = parse_depots_from_script(script);
        let base = depots.iter().find(|d| d.depot_id == "3282710").unwrap();
        let bonus = depots.iter().find(|d| d.depot_id == "3282721").unwrap();
        assert!(!base.is_token_based);
        assert!(bonus.is_token_based);
    }

    #[test]
    fn test_dlc_token_outside_lookahead_is_ignored() {
        let script = r#"-- Far DLC (AppID: 900)
addappid(901, 1, "a") -- One
addappid(902, 1, "b") -- Two
addappid(903, 1, "c") -- Three
addappid(904, 1, "d") -- Four
addtoken(900, "t")
"#;
        let depots = parse_depots_from_script(script);
        assert!(depots.iter().all(|d| !d.is_token_based));
    }
}
