use crate::{FieldValue, LsmTree};
use std::fs;
use std::path::Path;

pub fn open_tree(dir: &Path, threshold: usize) -> LsmTree {
    LsmTree::open(dir, threshold).expect("open database")
}

/// Convenience lookup for the `Int(key) -> Int(value)` stores the tests use.
pub fn get_int(tree: &LsmTree, key: i32) -> Option<i32> {
    match tree.get(&FieldValue::Int(key)).expect("get") {
        Some(record) => match record.value {
            FieldValue::Int(v) => Some(v),
            other => panic!("unexpected value variant: {other:?}"),
        },
        None => None,
    }
}

pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}
