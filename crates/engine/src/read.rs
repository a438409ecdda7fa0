//! Read path: `get()` and `scan()`.
//!
//! Point lookups check the memtable first (freshest data), then each level
//! from L1 upward; the first source holding the key decides the outcome, and
//! a tombstone anywhere masks everything below it.
//!
//! Range scans collect one sorted vector per source and drain them through a
//! k-way min-heap merge: duplicates collapse to the highest sequence number,
//! then tombstones are dropped, so only live key versions come back.

use crate::LsmTree;
use anyhow::Result;
use record::{FieldValue, Record};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

impl LsmTree {
    /// Looks up a key, returning the live record or `None` when the key is
    /// absent or tombstoned.
    pub fn get(&self, key: &FieldValue) -> Result<Option<Record>> {
        if let Some(entry) = self.mem.get(key) {
            return Ok(if entry.is_tombstone() {
                None
            } else {
                Some(entry.clone())
            });
        }

        for sst in self.levels.iter().flatten() {
            if let Some(record) = sst.search(key)? {
                return Ok(if record.is_tombstone() {
                    None
                } else {
                    Some(record)
                });
            }
        }

        Ok(None)
    }

    /// Scans `start <= key <= end` across the memtable and every level,
    /// returning live records in ascending key order.
    pub fn scan(&self, start: &FieldValue, end: &FieldValue) -> Result<Vec<Record>> {
        let mut sources: Vec<Vec<Record>> = Vec::with_capacity(self.levels.len() + 1);
        sources.push(self.mem.scan(start, end));
        for sst in self.levels.iter().flatten() {
            sources.push(sst.scan(start, end)?);
        }
        Ok(merge_sources(&sources))
    }
}

/// A pending record from one scan source, ordered for min-heap extraction.
struct HeapEntry {
    record: Record,
    source: usize,
    pos: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison to pop the
        // smallest key first. Ties break by source index, deterministically.
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Drains per-source sorted vectors in merged key order, collapsing
/// duplicate keys to the highest sequence number and dropping tombstones
/// after collapsing.
fn merge_sources(sources: &[Vec<Record>]) -> Vec<Record> {
    let mut heap = BinaryHeap::new();
    for (source, records) in sources.iter().enumerate() {
        if let Some(first) = records.first() {
            heap.push(HeapEntry {
                record: first.clone(),
                source,
                pos: 0,
            });
        }
    }

    let mut out = Vec::new();
    let mut current: Option<Record> = None;

    while let Some(entry) = heap.pop() {
        let next_pos = entry.pos + 1;
        if let Some(next) = sources[entry.source].get(next_pos) {
            heap.push(HeapEntry {
                record: next.clone(),
                source: entry.source,
                pos: next_pos,
            });
        }

        match &mut current {
            Some(cur) if cur.key == entry.record.key => {
                if entry.record.seq > cur.seq {
                    *cur = entry.record;
                }
            }
            _ => {
                if let Some(done) = current.take() {
                    if !done.is_tombstone() {
                        out.push(done);
                    }
                }
                current = Some(entry.record);
            }
        }
    }

    if let Some(done) = current {
        if !done.is_tombstone() {
            out.push(done);
        }
    }
    out
}
