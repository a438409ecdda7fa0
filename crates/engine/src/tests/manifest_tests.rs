use super::helpers::{get_int, open_tree};
use crate::{manifest, LsmTree};
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// -------------------- Close / reopen --------------------

#[test]
fn close_and_reopen_restores_every_key() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 10);
        for k in 0..=19 {
            tree.put(k, k * 10)?;
        }
        tree.close()?;
    }

    let tree = LsmTree::open(dir.path(), 10)?;
    for k in 0..=19 {
        assert_eq!(get_int(&tree, k), Some(k * 10), "key {k}");
    }
    assert_eq!(get_int(&tree, 99), None);
    Ok(())
}

#[test]
fn reopen_restores_the_level_layout() -> Result<()> {
    let dir = tempdir()?;
    let (levels_before, num_levels_before);
    {
        let mut tree = open_tree(dir.path(), 2);
        for k in 0..8 {
            tree.put(k, k * 10)?;
        }
        levels_before = tree.level_file_names();
        num_levels_before = tree.num_levels();
        tree.close()?;
    }

    let tree = LsmTree::open(dir.path(), 2)?;
    assert_eq!(tree.level_file_names(), levels_before);
    assert_eq!(tree.num_levels(), num_levels_before);
    Ok(())
}

#[test]
fn close_flushes_the_memtable() -> Result<()> {
    // Without a WAL, a clean close must persist buffered writes.
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 100);
        tree.put(1, 10)?;
        tree.put(2, 20)?;
        tree.close()?;
    }

    let tree = LsmTree::open(dir.path(), 100)?;
    assert_eq!(get_int(&tree, 1), Some(10));
    assert_eq!(get_int(&tree, 2), Some(20));
    Ok(())
}

#[test]
fn drop_saves_state_best_effort() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 100);
        tree.put(1, 10)?;
        // No close(): Drop must save.
    }

    let tree = LsmTree::open(dir.path(), 100)?;
    assert_eq!(get_int(&tree, 1), Some(10));
    Ok(())
}

// -------------------- Sequence / counter continuity --------------------

#[test]
fn sequence_numbers_continue_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 2);
        tree.put(1, 10)?;
        tree.put(2, 20)?; // flush
        tree.close()?;
    }

    let mut tree = LsmTree::open(dir.path(), 2)?;
    assert!(tree.seq() >= 2, "sequence resumed at {}", tree.seq());

    // A rewrite after reopen must shadow the on-disk version.
    tree.put(1, 99)?;
    assert_eq!(get_int(&tree, 1), Some(99));
    Ok(())
}

#[test]
fn writes_after_reopen_do_not_collide_with_old_files() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 2);
        for k in 0..4 {
            tree.put(k, k * 10)?;
        }
        tree.close()?;
    }

    let mut tree = LsmTree::open(dir.path(), 2)?;
    for k in 4..8 {
        tree.put(k, k * 10)?;
    }
    for k in 0..8 {
        assert_eq!(get_int(&tree, k), Some(k * 10), "key {k}");
    }
    Ok(())
}

// -------------------- Corruption --------------------

#[test]
fn missing_sstable_fails_the_reopen() -> Result<()> {
    let dir = tempdir()?;
    let victim;
    {
        let mut tree = open_tree(dir.path(), 2);
        for k in 0..4 {
            tree.put(k, k)?;
        }
        victim = tree
            .level_file_names()
            .into_iter()
            .flatten()
            .next()
            .expect("at least one level file");
        tree.close()?;
    }

    fs::remove_file(dir.path().join(&victim))?;
    let err = LsmTree::open(dir.path(), 2).unwrap_err();
    assert!(err.to_string().contains("corrupt manifest"), "{err:#}");
    Ok(())
}

#[test]
fn truncated_manifest_fails_to_parse() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 2);
        for k in 0..4 {
            tree.put(k, k)?;
        }
        tree.close()?;
    }

    let manifest_path = dir.path().join(manifest::MANIFEST_FILENAME);
    let bytes = fs::read(&manifest_path)?;
    fs::write(&manifest_path, &bytes[..bytes.len() / 2])?;

    assert!(LsmTree::open(dir.path(), 2).is_err());
    Ok(())
}

// -------------------- Manifest wire format --------------------

#[test]
fn manifest_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join(manifest::MANIFEST_FILENAME);
    let entries = vec![
        manifest::LevelEntry {
            level: 1,
            file_name: String::new(),
            capacity: 5,
        },
        manifest::LevelEntry {
            level: 2,
            file_name: "L2_SSTable_7.sst".to_string(),
            capacity: 10,
        },
    ];

    manifest::save(&path, &entries)?;
    let loaded = manifest::load(&path)?;
    assert_eq!(loaded, entries);
    Ok(())
}

#[test]
fn manifest_save_is_atomic() -> Result<()> {
    // A second save fully replaces the first; no tmp file lingers.
    let dir = tempdir()?;
    let path = dir.path().join(manifest::MANIFEST_FILENAME);
    manifest::save(
        &path,
        &[manifest::LevelEntry {
            level: 1,
            file_name: "L1_SSTable_0.sst".to_string(),
            capacity: 4,
        }],
    )?;
    manifest::save(&path, &[])?;

    assert!(manifest::load(&path)?.is_empty());
    let tmp_files = fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
        .count();
    assert_eq!(tmp_files, 0);
    Ok(())
}

#[test]
fn empty_levels_round_trip_through_the_manifest() -> Result<()> {
    // A deep cascade leaves L1/L2 empty; those rows must survive reopen.
    let dir = tempdir()?;
    {
        let mut tree = open_tree(dir.path(), 2);
        for k in 0..8 {
            tree.put(k, k)?;
        }
        let levels = tree.level_file_names();
        assert_eq!(levels[0], None);
        assert_eq!(levels[1], None);
        tree.close()?;
    }

    let tree = LsmTree::open(dir.path(), 2)?;
    let levels = tree.level_file_names();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], None);
    assert_eq!(levels[1], None);
    assert!(levels[2].is_some());
    Ok(())
}
