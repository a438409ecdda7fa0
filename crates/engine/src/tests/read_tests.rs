use super::helpers::{get_int, open_tree};
use crate::{EvictionPolicy, FieldValue};
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Memtable-only reads --------------------

#[test]
fn memtable_only_read() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 1000);
    tree.put(1, 100)?;
    tree.put(2, 200)?;
    tree.put(3, 300)?;

    assert_eq!(get_int(&tree, 2), Some(200));
    assert_eq!(get_int(&tree, 4), None);
    assert_eq!(tree.num_levels(), 1, "no flush yet");
    Ok(())
}

// -------------------- Tombstones --------------------

#[test]
fn tombstone_masks_a_memtable_value() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 1000);
    tree.put(7, 70)?;
    tree.delete(7)?;

    assert_eq!(get_int(&tree, 7), None);
    let scanned = tree.scan(&FieldValue::Int(0), &FieldValue::Int(100))?;
    assert!(scanned.is_empty(), "scan must omit the tombstoned key");
    Ok(())
}

#[test]
fn tombstone_masks_older_levels() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 2);
    tree.put(1, 10)?;
    tree.put(2, 20)?; // flush {1, 2} -> L1
    tree.delete(1)?;
    tree.put(3, 30)?; // flush {tomb(1), 3} -> merge -> L2

    assert_eq!(get_int(&tree, 1), None, "tombstone survives the merge");
    assert_eq!(get_int(&tree, 2), Some(20));
    assert_eq!(get_int(&tree, 3), Some(30));
    Ok(())
}

#[test]
fn rewrite_after_delete_resurrects_the_key() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 1000);
    tree.put(5, 50)?;
    tree.delete(5)?;
    tree.put(5, 55)?;
    assert_eq!(get_int(&tree, 5), Some(55));
    Ok(())
}

// -------------------- Level precedence --------------------

#[test]
fn memtable_shadows_disk_levels() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 2);
    tree.put(1, 10)?;
    tree.put(2, 20)?; // flush -> L1
    tree.put(1, 50)?; // stays in the memtable

    assert_eq!(get_int(&tree, 1), Some(50));
    Ok(())
}

#[test]
fn first_matching_level_wins() -> Result<()> {
    // After the cascade, key 1's newest version lives in L1 while an older
    // one was merged into L2; L1 must answer first.
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 2);
    tree.put(1, 10)?;
    tree.put(2, 20)?; // flush {1,2} -> L1
    tree.put(3, 30)?;
    tree.put(4, 40)?; // flush {3,4} -> merge -> L2 (holds 1,2,3,4)
    tree.put(1, 99)?;
    tree.put(5, 50)?; // flush {1',5} -> L1

    assert_eq!(get_int(&tree, 1), Some(99));
    Ok(())
}

// -------------------- Cache behaviour --------------------

#[test]
fn results_are_invariant_under_cache_configuration() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 5);
    for k in 0..=19 {
        tree.put(k, k * 10)?;
    }

    let reference: Vec<Option<i32>> = (0..=20).map(|k| get_int(&tree, k)).collect();

    for (capacity, policy) in [
        (2, EvictionPolicy::Lru),
        (2, EvictionPolicy::Clock),
        (2, EvictionPolicy::Random),
        (500, EvictionPolicy::Lru),
    ] {
        tree.configure_cache(capacity, policy)?;
        let observed: Vec<Option<i32>> = (0..=20).map(|k| get_int(&tree, k)).collect();
        assert_eq!(observed, reference, "{policy:?}/{capacity}");
    }
    Ok(())
}

#[test]
fn repeated_point_reads_hit_the_cache() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = open_tree(dir.path(), 5);
    for k in 0..10 {
        tree.put(k, k)?;
    }
    tree.configure_cache(100, EvictionPolicy::Lru)?;

    let before = tree.total_cache_hits()?;
    for _ in 0..10 {
        get_int(&tree, 0);
    }
    assert!(tree.total_cache_hits()? > before);
    Ok(())
}
