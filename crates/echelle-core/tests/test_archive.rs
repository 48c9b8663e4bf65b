#[allow(dead_code)]
mod common;

use std::thread;

use tempfile::TempDir;

use echelle_core::background::{ArchiveKey, BackgroundArchive, FileArchive, ObjectType};
use echelle_core::frame::Fiber;

use common::{date, model};

const SHAPE: (usize, usize) = (6, 9);

fn key(fiber: Fiber, object: &str) -> ArchiveKey {
    ArchiveKey {
        fiber,
        direction: "xr-".into(),
        object_type: ObjectType::classify(object),
        object: object.into(),
        shape: SHAPE,
    }
}

#[test]
fn test_missing_directory_is_empty_archive() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path().join("never-created"));
    assert!(archive.entries().unwrap().is_empty());
    assert!(archive.lookup(&key(Fiber::A, "HD 1")).unwrap().is_none());
}

#[test]
fn test_insert_then_lookup() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    let stored = model("f7", Fiber::A, "HD 1", &[(1, 3.0), (2, 4.0)], SHAPE, 1.5, Some(date(4, 1)));
    let path = archive.insert(&stored, "xr-").unwrap();

    assert_eq!(path, dir.path().join("f7_A.bkg"));
    assert!(dir.path().join("f7_A.toml").exists());

    let entries = archive.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].object_type, ObjectType::Star);
    assert_eq!((entries[0].height, entries[0].width), SHAPE);

    let found = archive.lookup(&key(Fiber::A, "HD 1")).unwrap().unwrap();
    assert_eq!(found, stored);
}

#[test]
fn test_reinsert_replaces_entry() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    archive
        .insert(&model("f7", Fiber::A, "HD 1", &[], SHAPE, 1.0, None), "xr-")
        .unwrap();
    archive
        .insert(&model("f7", Fiber::A, "HD 1", &[], SHAPE, 2.0, None), "xr-")
        .unwrap();

    assert_eq!(archive.entries().unwrap().len(), 1);
    let found = archive.lookup(&key(Fiber::A, "HD 1")).unwrap().unwrap();
    assert!(found.surface().iter().all(|&v| v == 2.0));
}

#[test]
fn test_lookup_prefers_same_star_then_latest() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    for (id, object, day) in [("old", "HD 1", 1), ("other", "HD 2", 9), ("new", "HD 1", 5)] {
        archive
            .insert(&model(id, Fiber::A, object, &[], SHAPE, 1.0, Some(date(day, 0))), "xr-")
            .unwrap();
    }

    let hit = archive.lookup(&key(Fiber::A, "hd 1")).unwrap().unwrap();
    assert_eq!(hit.info.file_id, "new");
    // Unknown star: latest star of any name.
    let hit = archive.lookup(&key(Fiber::A, "HD 77")).unwrap().unwrap();
    assert_eq!(hit.info.file_id, "other");
}

#[test]
fn test_lookup_respects_direction_fiber_and_lamp() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    archive
        .insert(&model("c1", Fiber::B, "Comb", &[], SHAPE, 1.0, None), "yb+")
        .unwrap();
    archive
        .insert(&model("c2", Fiber::B, "Comb", &[], SHAPE, 1.0, None), "xr-")
        .unwrap();

    let hit = archive.lookup(&key(Fiber::B, "comb")).unwrap().unwrap();
    assert_eq!(hit.info.file_id, "c2");
    assert!(archive.lookup(&key(Fiber::A, "Comb")).unwrap().is_none());
    assert!(archive.lookup(&key(Fiber::B, "FP")).unwrap().is_none());
}

#[test]
fn test_foreign_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    archive
        .insert(&model("f1", Fiber::A, "HD 1", &[], SHAPE, 1.0, None), "xr-")
        .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "observing log").unwrap();
    std::fs::write(dir.path().join(".f2_A.toml.1.0.tmp"), "partial").unwrap();
    std::fs::create_dir(dir.path().join("nested.toml")).unwrap();

    let entries = archive.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_id, "f1");
}

// ---------------------------------------------------------------------------
// Concurrent writers
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_inserts_keep_every_entry() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());

    thread::scope(|s| {
        for i in 0..16u32 {
            let archive = &archive;
            s.spawn(move || {
                let stored = model(
                    &format!("f{i:02}"),
                    Fiber::A,
                    "HD 1",
                    &[(1, 1.0), (2, 2.0)],
                    SHAPE,
                    i as f32,
                    Some(date(1, i)),
                );
                archive.insert(&stored, "xr-").unwrap();
            });
        }
    });

    let entries = archive.entries().unwrap();
    assert_eq!(entries.len(), 16);
    let ids: Vec<&str> = entries.iter().map(|e| e.file_id.as_str()).collect();
    let expected: Vec<String> = (0..16).map(|i| format!("f{i:02}")).collect();
    assert_eq!(ids, expected);

    // Latest observation wins and its file is intact.
    let hit = archive.lookup(&key(Fiber::A, "HD 1")).unwrap().unwrap();
    assert_eq!(hit.info.file_id, "f15");
    assert!(hit.surface().iter().all(|&v| v == 15.0));

    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
