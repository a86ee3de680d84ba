use basement_lib::constants::files;
use basement_lib::fix_applier::{fix_log_path, ArchiveFixEngine, FixTarget, UnfixOutcome};
use basement_lib::fix_history::FixHistoryStore;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().to_string();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn back_to_back_fixes_unfixed_newest_first_restore_original_tree() {
    let work = tempfile::tempdir().unwrap();
    let install = work.path().join("Half-Life 2");
    fs::create_dir_all(install.join("bin")).unwrap();
    fs::write(install.join("bin/engine.dll"), b"engine v1").unwrap();
    fs::write(install.join("hl2.exe"), b"exe v1").unwrap();
    let original = snapshot(&install);

    let engine = ArchiveFixEngine::new(FixHistoryStore::new(work.path().join("fixhistory.json")));
    let target = FixTarget {
        app_id: "220".to_string(),
        install_path: install.clone(),
        game_name: "Half-Life 2".to_string(),
    };

    let first = work.path().join("first.zip");
    write_zip(
        &first,
        &[
            ("HL2 Fix/bin/engine.dll", b"engine v2"),
            ("HL2 Fix/bin/steam_api.dll", b"emu"),
        ],
    );
    engine
        .apply_from_file(&first, &target, "https://fixes.invalid/220.zip", || None)
        .unwrap();
    let after_first = snapshot(&install);

    let second = work.path().join("second.zip");
    write_zip(&second, &[("hl2.exe", b"exe v2"), ("bin\\engine.dll", b"engine v3")]);
    let report = engine
        .apply_from_file(&second, &target, "local file", || None)
        .unwrap();
    assert_eq!(report.backed_up.len(), 2);
    assert_eq!(fs::read(install.join("bin/engine.dll")).unwrap(), b"engine v3");

    let log = fs::read_to_string(fix_log_path(&install, "220")).unwrap();
    assert_eq!(log.matches("[FIX]").count(), 2);

    assert!(matches!(
        engine.unfix("220", &install).unwrap(),
        UnfixOutcome::Reverted { restored: 2, deleted: 0, .. }
    ));
    assert_eq!(snapshot(&install), after_first);

    assert!(matches!(
        engine.unfix("220", &install).unwrap(),
        UnfixOutcome::Reverted { restored: 1, deleted: 1, .. }
    ));
    assert_eq!(snapshot(&install), original);
    assert!(!install.join(files::FIX_BACKUP_DIR).exists());

    assert_eq!(engine.unfix("220", &install).unwrap(), UnfixOutcome::NothingToUndo);
}
