//! Per-game fix log (`basement-fix-log-<appId>.log` in the install dir)
//!
//! One `[FIX]` ... `[/FIX]` block per applied fix, blocks separated by a
//! blank line. Blocks that cannot be read back are kept verbatim so that
//! removing one fix never loses another.

use chrono::NaiveDateTime;
use log::warn;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const GENERIC_FIX: &str = "Generic";
/// `Download URL:` value for archives picked from disk.
pub const LOCAL_FILE: &str = "local file";

const OPEN: &str = "[FIX]";
const CLOSE: &str = "[/FIX]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixLogEntry {
    pub date: NaiveDateTime,
    pub game_name: String,
    pub fix_type: String,
    pub download_url: String,
    pub backup_path: String,
    /// Install-relative paths written by the fix.
    pub files: Vec<String>,
    /// Subset of `files` that existed before and were backed up.
    pub backed_up: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBlock {
    Fix(FixLogEntry),
    /// Body of a block whose date could not be read.
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixLog {
    pub blocks: Vec<LogBlock>,
}

enum Section {
    None,
    Files,
    BackedUp,
}

fn parse_block(body: &str) -> Option<FixLogEntry> {
    let mut date = None;
    let mut entry = FixLogEntry {
        date: NaiveDateTime::default(),
        game_name: String::new(),
        fix_type: GENERIC_FIX.to_string(),
        download_url: String::new(),
        backup_path: String::new(),
        files: Vec::new(),
        backed_up: Vec::new(),
    };
    let mut section = Section::None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == CLOSE {
            break;
        }

        if let Some(v) = line.strip_prefix("Date:") {
            date = NaiveDateTime::parse_from_str(v.trim(), DATE_FORMAT).ok();
            section = Section::None;
        } else if let Some(v) = line.strip_prefix("Game:") {
            entry.game_name = v.trim().to_string();
            section = Section::None;
        } else if let Some(v) = line.strip_prefix("Fix Type:") {
            entry.fix_type = v.trim().to_string();
            section = Section::None;
        } else if let Some(v) = line.strip_prefix("Download URL:") {
            entry.download_url = v.trim().to_string();
            section = Section::None;
        } else if let Some(v) = line.strip_prefix("Backup Path:") {
            entry.backup_path = v.trim().to_string();
            section = Section::None;
        } else if line == "Files:" {
            section = Section::Files;
        } else if line == "BackedUp:" {
            section = Section::BackedUp;
        } else {
            match section {
                Section::Files => entry.files.push(line.to_string()),
                Section::BackedUp => entry.backed_up.push(line.to_string()),
                Section::None => {}
            }
        }
    }

    entry.date = date?;
    Some(entry)
}

impl FixLog {
    pub fn parse(content: &str) -> Self {
        let mut blocks = Vec::new();
        for chunk in content.split(OPEN).skip(1) {
            let body = chunk.split(CLOSE).next().unwrap_or_default();
            match parse_block(body) {
                Some(entry) => blocks.push(LogBlock::Fix(entry)),
                None => {
                    warn!("[fix_log] Keeping unreadable block as-is");
                    blocks.push(LogBlock::Raw(body.trim().to_string()));
                }
            }
        }
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn push(&mut self, entry: FixLogEntry) {
        self.blocks.push(LogBlock::Fix(entry));
    }

    pub fn entries(&self) -> impl Iterator<Item = &FixLogEntry> {
        self.blocks.iter().filter_map(|b| match b {
            LogBlock::Fix(entry) => Some(entry),
            LogBlock::Raw(_) => None,
        })
    }

    /// Index of the most recent fix. Ties go to the later block.
    pub fn latest_index(&self) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                LogBlock::Fix(entry) => Some((i, entry.date)),
                LogBlock::Raw(_) => None,
            })
            .max_by_key(|&(i, date)| (date, i))
            .map(|(i, _)| i)
    }

    pub fn remove(&mut self, index: usize) -> Option<LogBlock> {
        (index < self.blocks.len()).then(|| self.blocks.remove(index))
    }

    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                LogBlock::Fix(entry) => render_entry(entry),
                LogBlock::Raw(body) => format!("{}\n{}\n{}\n", OPEN, body, CLOSE),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn render_entry(entry: &FixLogEntry) -> String {
    let mut out = String::new();
    out.push_str(OPEN);
    out.push('\n');
    out.push_str(&format!("Date: {}\n", entry.date.format(DATE_FORMAT)));
    out.push_str(&format!("Game: {}\n", entry.game_name));
    out.push_str(&format!("Fix Type: {}\n", entry.fix_type));
    out.push_str(&format!("Download URL: {}\n", entry.download_url));
    out.push_str(&format!("Backup Path: {}\n", entry.backup_path));
    out.push_str("Files:\n");
    for file in &entry.files {
        out.push_str(file);
        out.push('\n');
    }
    if !entry.backed_up.is_empty() {
        out.push_str("BackedUp:\n");
        for file in &entry.backed_up {
            out.push_str(file);
            out.push('\n');
        }
    }
    out.push_str(CLOSE);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(day: u32, files: &[&str]) -> FixLogEntry {
        FixLogEntry {
            date: NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
            game_name: "Half-Life 2".to_string(),
            fix_type: GENERIC_FIX.to_string(),
            download_url: "https://example.invalid/400.zip".to_string(),
            backup_path: "/games/hl2/fixbackup/20240501123000".to_string(),
            files: files.iter().map(|s| s.to_string()).collect(),
            backed_up: vec![files[0].to_string()],
        }
    }

    #[test]
    fn test_render_format() {
        let text = render_entry(&entry(1, &["bin/a.dll", "b.txt"]));
        assert!(text.starts_with("[FIX]\nDate: 2024-05-01 12:30:00\nGame: Half-Life 2\nFix Type: Generic\n"));
        assert!(text.contains("Files:\nbin/a.dll\nb.txt\nBackedUp:\nbin/a.dll\n[/FIX]\n"));
    }

    #[test]
    fn test_parse_render_is_stable() {
        let mut log = FixLog::default();
        log.push(entry(1, &["a.txt"]));
        log.push(entry(2, &["b.txt", "c.txt"]));
        let text = log.render();
        assert!(text.contains("[/FIX]\n\n[FIX]"));

        let parsed = FixLog::parse(&text);
        assert_eq!(parsed, log);
        assert_eq!(parsed.render(), text);
    }

    #[test]
    fn test_latest_by_date_not_position() {
        let mut log = FixLog::default();
        log.push(entry(9, &["late.txt"]));
        log.push(entry(3, &["early.txt"]));
        assert_eq!(log.latest_index(), Some(0));
    }

    #[test]
    fn test_unreadable_block_survives_removal() {
        let mut text = String::from("[FIX]\nDate: yesterday\nGame: ???\n[/FIX]\n\n");
        text.push_str(&render_entry(&entry(4, &["x.txt"])));

        let mut log = FixLog::parse(&text);
        assert_eq!(log.blocks.len(), 2);
        let latest = log.latest_index().unwrap();
        assert_eq!(latest, 1);
        log.remove(latest);
        assert_eq!(log.render(), "[FIX]\nDate: yesterday\nGame: ???\n[/FIX]\n");
    }

    #[test]
    fn test_legacy_separator_is_ignored() {
        let text = format!("{}\n---\n{}", render_entry(&entry(1, &["a"])), render_entry(&entry(2, &["b"])));
        let log = FixLog::parse(&text);
        assert_eq!(log.entries().count(), 2);
        assert_eq!(log.entries().next().unwrap().files, vec!["a".to_string()]);
    }
}
