//! Depot decryption keys in Steam's `config/config.vdf`
//!
//! Reading is best-effort: any failure produces an unsuccessful, empty
//! extraction instead of an error. Writing splices missing `DecryptionKey`
//! entries into the original text without touching anything already there.

use crate::error::VdfError;
use crate::lua_parser;
use crate::vdf::{self, VdfObject};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const ROOT: &str = "InstallConfigStore";
const STEAM_SECTION: [&str; 4] = [ROOT, "Software", "Valve", "Steam"];
const DEPOTS: &str = "depots";
const DECRYPTION_KEY: &str = "DecryptionKey";

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyExtraction {
    pub success: bool,
    /// depot id -> uppercase hex key
    pub keys: BTreeMap<String, String>,
}

fn is_depot_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn is_hex_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_hexdigit())
}

/// The depots section, wherever this config keeps it.
fn find_depots(root: &VdfObject) -> Option<&VdfObject> {
    root.get_path(&STEAM_SECTION)
        .and_then(|steam| steam.get_object(DEPOTS))
        .or_else(|| root.get_path(&[ROOT, DEPOTS]))
}

/// Keys from an already-read config document. `filter_after` keeps only
/// depot ids numerically greater than the given id.
pub fn extract_keys_from_str(content: &str, filter_after: Option<&str>) -> KeyExtraction {
    let root = match vdf::parse(content) {
        Ok(root) => root,
        Err(e) => {
            warn!("[config_vdf] Could not parse config.vdf: {}", e);
            return KeyExtraction::default();
        }
    };

    let threshold: Option<u64> = filter_after.and_then(|id| id.trim().parse().ok());
    let mut keys = BTreeMap::new();

    if let Some(depots) = find_depots(&root) {
        for (depot_id, depot) in depots.objects() {
            if !is_depot_id(depot_id) {
                continue;
            }
            if let Some(min) = threshold {
                if depot_id.parse::<u64>().map_or(true, |id| id <= min) {
                    continue;
                }
            }
            if let Some(key) = depot.get_value(DECRYPTION_KEY).filter(|k| is_hex_key(k)) {
                keys.insert(depot_id.to_string(), key.to_ascii_uppercase());
            }
        }
    }

    KeyExtraction {
        success: true,
        keys,
    }
}

pub fn extract_keys(config_path: &Path, filter_after: Option<&str>) -> KeyExtraction {
    match std::fs::read_to_string(config_path) {
        Ok(content) => {
            let result = extract_keys_from_str(&content, filter_after);
            info!(
                "[config_vdf] Extracted {} depot keys from {}",
                result.keys.len(),
                config_path.display()
            );
            result
        }
        Err(e) => {
            warn!("[config_vdf] Cannot read {}: {}", config_path.display(), e);
            KeyExtraction::default()
        }
    }
}

/// Keys for a specific set of depots only.
pub fn extract_depot_keys(content: &str, depot_ids: &[String]) -> Vec<(String, String)> {
    let all = extract_keys_from_str(content, None).keys;
    depot_ids
        .iter()
        .filter_map(|id| all.get(id).map(|key| (id.clone(), key.clone())))
        .collect()
}

/// Keys embedded in an unlock script (`addappid(id, 1, "key")`).
pub fn extract_keys_from_script(content: &str) -> BTreeMap<String, String> {
    lua_parser::parse_depot_keys(content)
        .into_iter()
        .filter(|(_, key)| is_hex_key(key))
        .map(|(id, key)| (id, key.to_ascii_uppercase()))
        .collect()
}

/// Wire format for the key upload collaborator: `depotId;HEXKEY` per line.
pub fn format_keys_as_text(keys: &BTreeMap<String, String>) -> String {
    keys.iter()
        .map(|(id, key)| format!("{};{}\n", id, key))
        .collect()
}

/// Depot blocks for `keys`, nested inside any `wrappers` that still have to
/// be created, starting at `depth` tabs.
fn build_depot_entries(wrappers: &[&str], keys: &[(&str, &str)], depth: usize, nl: &str) -> String {
    let tabs = |n: usize| "\t".repeat(n);
    let mut out = String::new();
    for (i, key) in wrappers.iter().enumerate() {
        out.push_str(&format!("{}\"{}\"{nl}{}{{{nl}", tabs(depth + i), key, tabs(depth + i)));
    }
    let inner = depth + wrappers.len();
    for (depot_id, key) in keys {
        out.push_str(&format!(
            "{0}\"{1}\"{nl}{0}{{{nl}{2}\"{3}\"\t\t\"{4}\"{nl}{0}}}{nl}",
            tabs(inner),
            depot_id,
            tabs(inner + 1),
            DECRYPTION_KEY,
            key
        ));
    }
    for i in (0..wrappers.len()).rev() {
        out.push_str(&format!("{}}}{nl}", tabs(depth + i)));
    }
    out
}

/// Add decryption keys to config.vdf content. Depots that already exist are
/// left untouched and every existing line is kept byte for byte; new blocks
/// go at the top of the depots section, which is created when missing.
pub fn add_decryption_keys(content: &str, depot_keys: &[(String, String)]) -> Result<String, VdfError> {
    let root = vdf::parse(content)?;

    let existing: HashSet<&str> = find_depots(&root)
        .map(|d| d.objects().map(|(id, _)| id).collect())
        .unwrap_or_default();

    let mut new_keys: Vec<(&str, &str)> = Vec::new();
    for (id, key) in depot_keys {
        if is_depot_id(id)
            && !key.is_empty()
            && !existing.contains(id.as_str())
            && !new_keys.iter().any(|(seen, _)| *seen == id.as_str())
        {
            new_keys.push((id.as_str(), key.as_str()));
        }
    }

    if new_keys.is_empty() {
        info!("[config_vdf] All depot keys already exist in config.vdf");
        return Ok(content.to_string());
    }

    info!("[config_vdf] Adding {} new depot keys to config.vdf", new_keys.len());
    let nl = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let spans = vdf::object_spans(content)?;
    let find = |path: &[&str]| {
        spans
            .iter()
            .find(|span| {
                span.path.len() == path.len()
                    && span.path.iter().zip(path).all(|(a, b)| a.eq_ignore_ascii_case(b))
            })
            .map(|span| span.body_start)
    };

    let nested: Vec<&str> = STEAM_SECTION.iter().copied().chain([DEPOTS]).collect();
    let flat = [ROOT, DEPOTS];

    let (insert_at, depth, wrappers) = if let Some(at) = find(&nested[..]) {
        (at, nested.len(), &nested[nested.len()..])
    } else if let Some(at) = find(&flat[..]) {
        (at, flat.len(), &nested[nested.len()..])
    } else {
        // Deepest part of InstallConfigStore/Software/Valve/Steam that exists.
        match (1..STEAM_SECTION.len() + 1)
            .rev()
            .find_map(|len| find(&nested[..len]).map(|at| (at, len)))
        {
            Some((at, len)) => (at, len, &nested[len..]),
            None => (content.len(), 0, &nested[..]),
        }
    };

    let mut result = String::with_capacity(content.len() + 128 * new_keys.len());
    result.push_str(&content[..insert_at]);
    if insert_at == content.len() && !content.is_empty() && !content.ends_with('\n') {
        result.push_str(nl);
    }
    result.push_str(&build_depot_entries(wrappers, &new_keys, depth, nl));
    result.push_str(&content[insert_at..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#""InstallConfigStore"
{
	"Software"
	{
		"Valve"
		{
			"Steam"
			{
				"depots"
				{
					"228988"
					{
						"DecryptionKey"		"abc123"
					}
					"228990"
					{
						"DecryptionKey"		"DEF456"
					}
					"notadepot"
					{
						"DecryptionKey"		"ff"
					}
				}
			}
		}
	}
}
"#;

    #[test]
    fn test_extract_uppercases_keys() {
        let result = extract_keys_from_str(CONFIG, None);
        assert!(result.success);
        assert_eq!(result.keys.len(), 2);
        assert_eq!(result.keys["228988"], "ABC123");
        assert_eq!(result.keys["228990"], "DEF456");
    }

    #[test]
    fn test_extract_filter_after() {
        let result = extract_keys_from_str(CONFIG, Some("228988"));
        assert_eq!(result.keys.keys().collect::<Vec<_>>(), vec!["228990"]);
    }

    #[test]
    fn test_parse_failure_is_not_fatal() {
        let result = extract_keys_from_str("\"InstallConfigStore\"\n{\n", None);
        assert!(!result.success);
        assert!(result.keys.is_empty());

        let missing = extract_keys(Path::new("/no/such/config.vdf"), None);
        assert!(!missing.success);
    }

    #[test]
    fn test_format_keys_as_text() {
        let keys = extract_keys_from_str(CONFIG, None).keys;
        assert_eq!(format_keys_as_text(&keys), "228988;ABC123\n228990;DEF456\n");
    }

    #[test]
    fn test_extract_depot_keys_subset() {
        let keys = extract_depot_keys(CONFIG, &["228990".to_string(), "1".to_string()]);
        assert_eq!(keys, vec![("228990".to_string(), "DEF456".to_string())]);
    }

    #[test]
    fn test_new_depots_are_added_next_to_existing_ones() {
        let keys = vec![
            ("123456".to_string(), "aa11".to_string()),
            ("789012".to_string(), "bb22".to_string()),
        ];

        let result = add_decryption_keys(CONFIG, &keys).unwrap();
        let parsed = extract_keys_from_str(&result, None);
        assert_eq!(parsed.keys.len(), 4);
        assert_eq!(parsed.keys["123456"], "AA11");
        assert!(result.contains("\t\t\t\t\t\"123456\"\n\t\t\t\t\t{\n\t\t\t\t\t\t\"DecryptionKey\"\t\t\"aa11\"\n"));
        assert!(result.contains("\"DecryptionKey\"\t\t\"abc123\""));
    }

    #[test]
    fn test_existing_depot_key_is_never_replaced() {
        let keys = vec![
            ("228988".to_string(), "ffff".to_string()),
            ("789012".to_string(), "cc33".to_string()),
            ("789012".to_string(), "dd44".to_string()),
        ];

        let result = add_decryption_keys(CONFIG, &keys).unwrap();
        assert!(result.contains("\"abc123\""));
        assert!(!result.contains("\"ffff\""));
        assert_eq!(result.matches("\"789012\"").count(), 1);
        assert!(result.contains("\"cc33\""));
    }

    #[test]
    fn test_untouched_lines_survive_injection() {
        let content = "\"InstallConfigStore\"\n{\n\t// written by hand\n\t\"Blob\"\t\t\"{\\\"a\\\":1}\"\n\t\"Name\"\t\t\"one\"\n\t\"name\"\t\t\"two\"\n\t\"depots\"\n\t{\n\t}\n}\n";
        let result = add_decryption_keys(content, &[("1".to_string(), "aa".to_string())]).unwrap();

        let expected = content.replacen(
            "\t\"depots\"\n\t{\n",
            "\t\"depots\"\n\t{\n\t\t\"1\"\n\t\t{\n\t\t\t\"DecryptionKey\"\t\t\"aa\"\n\t\t}\n",
            1,
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_crlf_config_stays_crlf() {
        let content = CONFIG.replace('\n', "\r\n");
        let result = add_decryption_keys(&content, &[("5".to_string(), "ab".to_string())]).unwrap();
        assert!(!result.replace("\r\n", "").contains('\n'));
        assert_eq!(extract_keys_from_str(&result, None).keys["5"], "AB");
    }

    #[test]
    fn test_missing_steam_section_is_created_inside_valve() {
        let content = "\"InstallConfigStore\"\n{\n\t\"Software\"\n\t{\n\t\t\"Valve\"\n\t\t{\n\t\t\t\"Other\"\t\t\"x\"\n\t\t}\n\t}\n}\n";
        let result = add_decryption_keys(content, &[("7".to_string(), "cd".to_string())]).unwrap();

        let root = vdf::parse(&result).unwrap();
        let valve = root.get_path(&["InstallConfigStore", "Software", "Valve"]).unwrap();
        assert_eq!(valve.get_value("Other"), Some("x"));
        assert_eq!(
            valve.get_path(&["Steam", "depots", "7"]).and_then(|d| d.get_value("DecryptionKey")),
            Some("cd")
        );
    }

    #[test]
    fn test_flat_depots_section_is_reused() {
        let content = "\"InstallConfigStore\"\n{\n\t\"depots\"\n\t{\n\t}\n}\n";
        let result = add_decryption_keys(content, &[("1".to_string(), "aa".to_string())]).unwrap();
        assert!(!result.contains("\"Software\""));
        assert_eq!(extract_keys_from_str(&result, None).keys["1"], "AA");
    }

    #[test]
    fn test_creates_depots_section_when_missing() {
        let result = add_decryption_keys("", &[("10".to_string(), "bb".to_string())]).unwrap();
        let root = vdf::parse(&result).unwrap();
        assert!(root.get_path(&["InstallConfigStore", "Software", "Valve", "Steam", "depots", "10"]).is_some());
    }

    #[test]
    fn test_unchanged_when_nothing_new() {
        let keys = vec![("228988".to_string(), "abc123".to_string())];
        assert_eq!(add_decryption_keys(CONFIG, &keys).unwrap(), CONFIG);
    }

    #[test]
    fn test_keys_from_script() {
        let keys = extract_keys_from_script(
            "addappid(400)\naddappid(401, 1, \"a1b2\") -- Content\naddappid(402, 0, \"zz\")\n",
        );
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["401"], "A1B2");
    }
}
