//! Archive access for fix packages (zip and 7z, optionally encrypted)
//!
//! Formats are recognised by magic bytes, never by file extension, and
//! encryption is read from entry metadata.

use crate::error::FixError;
use log::warn;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

const MAGIC_ZIP: [u8; 4] = [0x50, 0x4B, 0x03, 0x04]; // "PK\x03\x04"
const MAGIC_ZIP_EMPTY: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const MAGIC_7Z: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
/// 7z coder id for AES-256 + SHA-256.
const SEVENZ_AES_METHOD: [u8; 4] = [0x06, 0xF1, 0x07, 0x01];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name with `/` separators, as stored in the archive.
    pub name: String,
    pub is_dir: bool,
    pub encrypted: bool,
}

pub fn detect_format(path: &Path) -> Result<ArchiveFormat, FixError> {
    let mut header = [0u8; 6];
    let mut file = File::open(path)
        .map_err(|e| FixError::io(format!("Failed to open {}", path.display()), e))?;
    let read = file
        .read(&mut header)
        .map_err(|e| FixError::io(format!("Failed to read {}", path.display()), e))?;

    if read >= 4 && (header[..4] == MAGIC_ZIP || header[..4] == MAGIC_ZIP_EMPTY) {
        Ok(ArchiveFormat::Zip)
    } else if read == 6 && header == MAGIC_7Z {
        Ok(ArchiveFormat::SevenZ)
    } else {
        Err(FixError::Archive(format!(
            "{} is not a zip or 7z archive",
            path.display()
        )))
    }
}

fn seven_z_password(password: Option<&str>) -> sevenz_rust::Password {
    match password {
        Some(pw) => sevenz_rust::Password::from(pw),
        None => sevenz_rust::Password::empty(),
    }
}

fn zip_err(e: zip::result::ZipError) -> FixError {
    FixError::Archive(e.to_string())
}

fn seven_z_err(e: sevenz_rust::Error) -> FixError {
    match e {
        sevenz_rust::Error::PasswordRequired => FixError::PasswordRequired,
        other => FixError::Archive(other.to_string()),
    }
}

/// An archive on disk, reopened for every pass.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
    format: ArchiveFormat,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> Result<Self, FixError> {
        Ok(Self {
            format: detect_format(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn open_zip(&self) -> Result<zip::ZipArchive<BufReader<File>>, FixError> {
        let file = File::open(&self.path)
            .map_err(|e| FixError::io(format!("Failed to open {}", self.path.display()), e))?;
        zip::ZipArchive::new(BufReader::new(file)).map_err(zip_err)
    }

    fn open_7z(&self, password: Option<&str>) -> Result<sevenz_rust::SevenZReader<File>, FixError> {
        sevenz_rust::SevenZReader::open(&self.path, seven_z_password(password)).map_err(seven_z_err)
    }

    /// Entry listing. Encrypted 7z headers need the password to be listed.
    pub fn entries(&self, password: Option<&str>) -> Result<Vec<ArchiveEntry>, FixError> {
        match self.format {
            ArchiveFormat::Zip => {
                let mut archive = self.open_zip()?;
                let mut entries = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let file = archive.by_index_raw(i).map_err(zip_err)?;
                    entries.push(ArchiveEntry {
                        name: file.name().replace('\\', "/"),
                        is_dir: file.is_dir(),
                        encrypted: file.encrypted(),
                    });
                }
                Ok(entries)
            }
            ArchiveFormat::SevenZ => {
                let reader = self.open_7z(password)?;
                let archive = reader.archive();
                let encrypted = archive.folders.iter().any(|folder| {
                    folder
                        .coders
                        .iter()
                        .any(|coder| coder.decompression_method_id() == SEVENZ_AES_METHOD)
                });
                Ok(archive
                    .files
                    .iter()
                    .map(|entry| ArchiveEntry {
                        name: entry.name().replace('\\', "/"),
                        is_dir: entry.is_directory(),
                        encrypted: encrypted && entry.has_stream,
                    })
                    .collect())
            }
        }
    }

    /// True if any entry (or the 7z header itself) is encrypted.
    pub fn is_encrypted(&self) -> Result<bool, FixError> {
        match self.entries(None) {
            Ok(entries) => Ok(entries.iter().any(|e| e.encrypted)),
            Err(FixError::PasswordRequired) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Stream the first file entry with `password`. Any failure here means
    /// the password is wrong.
    pub fn verify_password(&self, password: &str) -> Result<(), FixError> {
        let result = self.for_each_file(Some(password), |_, reader| {
            io::copy(reader, &mut io::sink())
                .map_err(|e| FixError::io("Failed to read first entry", e))?;
            Ok(false)
        });
        result.map_err(|e| {
            warn!("[archive] Password check failed: {}", e);
            FixError::InvalidPassword
        })
    }

    /// Visit every non-directory entry in archive order. The callback
    /// returns `Ok(false)` to stop early.
    pub fn for_each_file<F>(&self, password: Option<&str>, mut each: F) -> Result<(), FixError>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<bool, FixError>,
    {
        match self.format {
            ArchiveFormat::Zip => {
                let mut archive = self.open_zip()?;
                for i in 0..archive.len() {
                    let mut file = match password {
                        Some(pw) => archive.by_index_decrypt(i, pw.as_bytes()),
                        None => archive.by_index(i),
                    }
                    .map_err(|e| match e {
                        zip::result::ZipError::InvalidPassword => FixError::InvalidPassword,
                        other => zip_err(other),
                    })?;
                    if file.is_dir() {
                        continue;
                    }
                    let name = file.name().replace('\\', "/");
                    if !each(&name, &mut file)? {
                        break;
                    }
                }
                Ok(())
            }
            ArchiveFormat::SevenZ => {
                let mut reader = self.open_7z(password)?;
                let mut failure: Option<FixError> = None;
                // A stop only ends the current block; later blocks are still
                // decoded, so every call after it is a no-op.
                let mut stopped = false;
                let walked = reader.for_each_entries(|entry, data| {
                    if stopped {
                        return Ok(false);
                    }
                    if entry.is_directory() {
                        return Ok(true);
                    }
                    let name = entry.name().replace('\\', "/");
                    match each(&name, data) {
                        Ok(go_on) => {
                            stopped = !go_on;
                            Ok(go_on)
                        }
                        Err(e) => {
                            failure = Some(e);
                            stopped = true;
                            Ok(false)
                        }
                    }
                });
                match failure {
                    Some(e) => Err(e),
                    None => walked.map_err(seven_z_err),
                }
            }
        }
    }
}

/// Clean up an entry name: `\` becomes `/`, empty and `.` segments are
/// dropped. Absolute names and names containing `..` are rejected.
pub fn normalize_entry_path(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }

    let mut parts = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if parts.is_empty() && s.ends_with(':') => return None,
            s => parts.push(s),
        }
    }

    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Join a `/`-separated relative path onto `base` one segment at a time.
pub fn join_relative(base: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}

/// Longest run of leading directories shared by every file, with a trailing
/// `/`, or an empty string. Fewer than two files never strip anything.
pub fn common_base_path(files: &[String]) -> String {
    if files.len() < 2 {
        return String::new();
    }

    let dirs_of = |path: &str| -> Vec<String> {
        let mut parts: Vec<String> = path.split('/').map(str::to_string).collect();
        parts.pop();
        parts
    };

    let mut common = dirs_of(&files[0]);
    for path in &files[1..] {
        if common.is_empty() {
            break;
        }
        let dirs = dirs_of(path);
        let shared = common
            .iter()
            .zip(dirs.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }

    if common.is_empty() {
        String::new()
    } else {
        format!("{}/", common.join("/"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::unstable::write::FileOptionsExt;
    use zip::write::SimpleFileOptions;

    /// Build a zip at `path` from `(name, content)` pairs; `None` content
    /// adds a directory entry.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)], password: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            match content {
                Some(bytes) => {
                    let mut options = SimpleFileOptions::default();
                    if let Some(pw) = password {
                        options = options.with_deprecated_encryption(pw.as_bytes());
                    }
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(bytes).unwrap();
                }
                None => {
                    zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    /// Build a 7z at `path`. A password turns on AES for the contents;
    /// `encrypt_header` also hides the entry listing behind it.
    pub(crate) fn write_7z(
        path: &Path,
        entries: &[(&str, &[u8])],
        password: Option<&str>,
        encrypt_header: bool,
    ) {
        let mut writer = sevenz_rust::SevenZWriter::create(path).unwrap();
        if let Some(pw) = password {
            writer.set_content_methods(vec![
                sevenz_rust::AesEncoderOptions::new(pw.into()).into(),
                sevenz_rust::lzma::LZMA2Options::with_preset(1).into(),
            ]);
        }
        writer.set_encrypt_header(encrypt_header);
        for (name, bytes) in entries {
            let mut entry = sevenz_rust::SevenZArchiveEntry::new();
            entry.name = name.to_string();
            entry.has_stream = true;
            writer.push_archive_entry(entry, Some(*bytes)).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_all(source: &ArchiveSource, password: Option<&str>) -> Vec<(String, String)> {
        let mut seen = Vec::new();
        source
            .for_each_file(password, |name, reader| {
                let mut s = String::new();
                reader.read_to_string(&mut s).unwrap();
                seen.push((name.to_string(), s));
                Ok(true)
            })
            .unwrap();
        seen
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_base_is_stripped() {
        assert_eq!(common_base_path(&strings(&["root/a.txt", "root/sub/b.txt"])), "root/");
        assert_eq!(
            common_base_path(&strings(&["root/x/a.txt", "root/x/sub/b.txt"])),
            "root/x/"
        );
    }

    #[test]
    fn test_no_common_base() {
        assert_eq!(common_base_path(&strings(&["a.txt", "sub/b.txt"])), "");
        assert_eq!(common_base_path(&strings(&["one/a.txt", "two/b.txt"])), "");
    }

    #[test]
    fn test_single_file_never_stripped() {
        assert_eq!(common_base_path(&strings(&["root/a.txt"])), "");
    }

    #[test]
    fn test_file_named_like_base_prevents_stripping() {
        assert_eq!(common_base_path(&strings(&["root/a.txt", "root"])), "");
    }

    #[test]
    fn test_normalize_entry_path() {
        assert_eq!(normalize_entry_path("bin\\x64\\game.dll").as_deref(), Some("bin/x64/game.dll"));
        assert_eq!(normalize_entry_path("./a//b.txt").as_deref(), Some("a/b.txt"));
        assert_eq!(normalize_entry_path("../evil.dll"), None);
        assert_eq!(normalize_entry_path("a/../../evil.dll"), None);
        assert_eq!(normalize_entry_path("/etc/passwd"), None);
        assert_eq!(normalize_entry_path("C:/Windows/x.dll"), None);
        assert_eq!(normalize_entry_path("dir/"), Some("dir".to_string()));
    }

    #[test]
    fn test_detect_format_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("fix.bin");
        write_zip(&zip_path, &[("a.txt", Some(b"a"))], None);
        assert_eq!(detect_format(&zip_path).unwrap(), ArchiveFormat::Zip);

        let junk = dir.path().join("fix.zip");
        std::fs::write(&junk, b"not an archive").unwrap();
        assert!(matches!(detect_format(&junk), Err(FixError::Archive(_))));
    }

    #[test]
    fn test_zip_entries_and_encryption() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.zip");
        write_zip(&plain, &[("root/", None), ("root/a.txt", Some(b"a"))], None);
        let source = ArchiveSource::open(&plain).unwrap();
        let entries = source.entries(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert!(!source.is_encrypted().unwrap());

        let locked = dir.path().join("locked.zip");
        write_zip(&locked, &[("a.txt", Some(b"secret"))], Some("hunter2"));
        let source = ArchiveSource::open(&locked).unwrap();
        assert!(source.is_encrypted().unwrap());
        assert!(source.verify_password("hunter2").is_ok());
        assert!(matches!(
            source.verify_password("wrong"),
            Err(FixError::InvalidPassword)
        ));
    }

    #[test]
    fn test_for_each_file_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.zip");
        write_zip(&path, &[("d/", None), ("d/a.txt", Some(b"A")), ("b.txt", Some(b"B"))], None);

        let mut seen = Vec::new();
        ArchiveSource::open(&path)
            .unwrap()
            .for_each_file(None, |name, reader| {
                let mut s = String::new();
                reader.read_to_string(&mut s).unwrap();
                seen.push((name.to_string(), s));
                Ok(true)
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("d/a.txt".to_string(), "A".to_string()),
                ("b.txt".to_string(), "B".to_string())
            ]
        );
    }

    #[test]
    fn test_plain_7z_is_listed_and_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.bin");
        write_7z(&path, &[("Fix/a.txt", b"A"), ("Fix/b.txt", b"B")], None, false);

        let source = ArchiveSource::open(&path).unwrap();
        assert_eq!(source.format(), ArchiveFormat::SevenZ);
        assert!(!source.is_encrypted().unwrap());
        let names: Vec<_> = source.entries(None).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Fix/a.txt", "Fix/b.txt"]);
        assert_eq!(
            read_all(&source, None),
            vec![
                ("Fix/a.txt".to_string(), "A".to_string()),
                ("Fix/b.txt".to_string(), "B".to_string())
            ]
        );
    }

    #[test]
    fn test_7z_with_encrypted_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.7z");
        write_7z(&path, &[("a.txt", b"secret")], Some("hunter2"), false);

        let source = ArchiveSource::open(&path).unwrap();
        let entries = source.entries(None).unwrap();
        assert!(entries[0].encrypted);
        assert!(source.is_encrypted().unwrap());
        assert!(source.verify_password("hunter2").is_ok());
        assert!(matches!(
            source.verify_password("wrong"),
            Err(FixError::InvalidPassword)
        ));
        assert!(matches!(
            source.for_each_file(None, |_, _| Ok(true)),
            Err(FixError::PasswordRequired)
        ));
        assert_eq!(
            read_all(&source, Some("hunter2")),
            vec![("a.txt".to_string(), "secret".to_string())]
        );
    }

    #[test]
    fn test_7z_with_encrypted_header_needs_password_to_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidden.7z");
        write_7z(&path, &[("a.txt", b"secret")], Some("hunter2"), true);

        let source = ArchiveSource::open(&path).unwrap();
        assert!(matches!(source.entries(None), Err(FixError::PasswordRequired)));
        assert!(source.is_encrypted().unwrap());
        assert!(source.verify_password("hunter2").is_ok());
        assert_eq!(source.entries(Some("hunter2")).unwrap()[0].name, "a.txt");
    }

    #[test]
    fn test_7z_callback_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.7z");
        write_7z(&path, &[("a.txt", b"A"), ("b.txt", b"B")], None, false);

        let mut visited = 0;
        let result = ArchiveSource::open(&path).unwrap().for_each_file(None, |_, _| {
            visited += 1;
            Err(FixError::Archive("disk full".to_string()))
        });
        assert_eq!(visited, 1);
        assert!(matches!(result, Err(FixError::Archive(msg)) if msg == "disk full"));
    }

    #[test]
    fn test_7z_early_stop_spans_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.7z");
        write_7z(&path, &[("a.txt", b"A"), ("b.txt", b"B"), ("c.txt", b"C")], None, false);

        let mut names = Vec::new();
        ArchiveSource::open(&path)
            .unwrap()
            .for_each_file(None, |name, _| {
                names.push(name.to_string());
                Ok(false)
            })
            .unwrap();
        assert_eq!(names, vec!["a.txt"]);
    }
}
