//! Bottom-up SSTable construction.
//!
//! Two entry points build a table file:
//!
//! - [`SsTable::build`] packs an already-sorted record slice into leaves.
//! - [`SsTable::from_leaf_file`] consumes a scratch file of pre-built leaf
//!   pages produced by the merge engine.
//!
//! Both share the internal-level construction: starting from the per-leaf
//! smallest keys, children are grouped up to the derived fanout per node
//! (each node's keys being the smallest keys of its 2nd..last children) and
//! levels are written bottom-up until a single root remains. The
//! construction arena (leaf vector, offset/key level vectors) lives only
//! inside these functions; the returned handle owns nothing but the open
//! file and its metadata.

use crate::table::SsTable;
use crate::{LEAF_BLOOM_BITS, LEAF_BLOOM_KEYS};
use anyhow::{anyhow, ensure, Result};
use bloom::BloomFilter;
use pager::{InternalNode, LeafNode, Page, PageManager, SstMeta};
use record::Record;
use std::path::Path;

/// Greedy leaf packer with a running size budget.
///
/// Records are appended while `base_size + Σ entry_size` stays within the
/// page size; the first record that does not fit finalizes the current leaf
/// and opens a fresh one. Every leaf carries a bloom filter built over
/// exactly the records placed in it.
pub(crate) struct LeafBuilder {
    page_size: usize,
    node: LeafNode,
    running: usize,
}

impl LeafBuilder {
    pub(crate) fn new(page_size: usize) -> Result<Self> {
        let node = fresh_leaf()?;
        let running = node.base_size();
        Ok(Self {
            page_size,
            node,
            running,
        })
    }

    /// Appends a record, returning the finalized previous leaf when the
    /// record does not fit in it.
    pub(crate) fn push(&mut self, record: Record) -> Result<Option<LeafNode>> {
        let cost = LeafNode::entry_size(&record);
        let mut finalized = None;
        if !self.node.entries.is_empty() && self.running + cost > self.page_size {
            let full = std::mem::replace(&mut self.node, fresh_leaf()?);
            self.running = self.node.base_size();
            finalized = Some(full);
        }
        self.node.push(record);
        self.running += cost;
        Ok(finalized)
    }

    /// Returns the trailing leaf, if any records remain in it.
    pub(crate) fn finish(self) -> Option<LeafNode> {
        if self.node.entries.is_empty() {
            None
        } else {
            Some(self.node)
        }
    }
}

fn fresh_leaf() -> Result<LeafNode> {
    Ok(LeafNode::new(Some(BloomFilter::new(
        LEAF_BLOOM_BITS,
        LEAF_BLOOM_KEYS,
    )?)))
}

impl SsTable {
    /// Builds an SSTable at `path` from a sorted record slice.
    ///
    /// Page 0 is reserved for metadata up front; leaves are packed and
    /// written at contiguous offsets with their chain links fixed up, the
    /// internal levels follow bottom-up, and the metadata page is finalized
    /// last.
    ///
    /// # Errors
    ///
    /// `records` must be non-empty and sorted by key (callers drain the
    /// memtable in order, so only emptiness is checked).
    pub fn build<P: AsRef<Path>>(
        path: P,
        records: &[Record],
        page_size: usize,
    ) -> Result<SsTable> {
        ensure!(
            !records.is_empty(),
            "cannot build an sstable from an empty record set"
        );
        let path = path.as_ref().to_path_buf();
        let mut pager = PageManager::open(&path, page_size)?;

        // Reserve offset 0; real contents are written once offsets are known.
        pager.write_page(0, &Page::Metadata(SstMeta::default()))?;

        let mut leaves: Vec<LeafNode> = Vec::new();
        let mut builder = LeafBuilder::new(page_size)?;
        for record in records {
            if let Some(full) = builder.push(record.clone())? {
                leaves.push(full);
            }
        }
        if let Some(last) = builder.finish() {
            leaves.push(last);
        }

        let smallest: Vec<Record> = leaves
            .iter()
            .map(|leaf| {
                leaf.entries
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow!("packed an empty leaf"))
            })
            .collect::<Result<_>>()?;

        // Leaves first, at contiguous offsets, chained to their successors.
        let offsets: Vec<u64> = (0..leaves.len()).map(|_| pager.allocate_page()).collect();
        for (idx, mut leaf) in leaves.into_iter().enumerate() {
            leaf.next_leaf = if idx + 1 < offsets.len() {
                offsets[idx + 1]
            } else {
                0
            };
            pager.write_page(offsets[idx], &Page::Leaf(leaf))?;
        }
        let leaf_begin = offsets[0];
        let leaf_end = offsets[offsets.len() - 1];

        let root_offset = write_internal_levels(&mut pager, &offsets, &smallest, page_size)?;

        let file_name = file_name_of(&path);
        pager.write_page(
            0,
            &Page::Metadata(SstMeta {
                root_offset,
                leaf_begin,
                leaf_end,
                file_name,
                bloom: None,
            }),
        )?;
        pager.sync()?;

        let max_seq = records.iter().map(|r| r.seq).max().unwrap_or(0);
        Ok(SsTable {
            path,
            pager,
            root_offset,
            leaf_begin,
            leaf_end,
            num_entries: records.len() as u64,
            max_seq,
        })
    }

    /// Assembles an SSTable at `path` from a merge-produced scratch file of
    /// leaf pages.
    ///
    /// The scratch file's page 0 is a reserved placeholder; leaves occupy
    /// offsets `page_size × [1..=num_pages]`. Each leaf is copied to the new
    /// file with its `next_leaf` rewritten to its successor (last → 0), then
    /// the internal levels are built over the passed smallest-key vector.
    /// The caller deletes the scratch file afterwards.
    pub fn from_leaf_file<P: AsRef<Path>, Q: AsRef<Path>>(
        path: P,
        leaf_path: Q,
        smallest_keys: &[Record],
        num_pages: u64,
        num_entries: u64,
        page_size: usize,
    ) -> Result<SsTable> {
        ensure!(num_pages > 0, "scratch file holds no leaf pages");
        ensure!(
            smallest_keys.len() as u64 == num_pages,
            "smallest-key vector does not match the leaf page count"
        );

        let scratch = PageManager::open(leaf_path, page_size)?;
        let path = path.as_ref().to_path_buf();
        let mut pager = PageManager::open(&path, page_size)?;
        pager.write_page(0, &Page::Metadata(SstMeta::default()))?;

        let ps = page_size as u64;
        let mut offsets = Vec::with_capacity(num_pages as usize);
        let mut max_seq = 0u64;
        for idx in 0..num_pages {
            let src = scratch.read_page((idx + 1) * ps)?;
            let mut leaf = src.leaf()?.clone();
            for entry in &leaf.entries {
                max_seq = max_seq.max(entry.seq);
            }
            let offset = pager.allocate_page();
            leaf.next_leaf = if idx + 1 < num_pages { offset + ps } else { 0 };
            pager.write_page(offset, &Page::Leaf(leaf))?;
            offsets.push(offset);
        }
        let leaf_begin = offsets[0];
        let leaf_end = offsets[offsets.len() - 1];

        let root_offset = write_internal_levels(&mut pager, &offsets, smallest_keys, page_size)?;

        let file_name = file_name_of(&path);
        pager.write_page(
            0,
            &Page::Metadata(SstMeta {
                root_offset,
                leaf_begin,
                leaf_end,
                file_name,
                bloom: None,
            }),
        )?;
        pager.sync()?;

        Ok(SsTable {
            path,
            pager,
            root_offset,
            leaf_begin,
            leaf_end,
            num_entries,
            max_seq,
        })
    }
}

/// Builds the internal levels bottom-up and returns the root offset.
///
/// A table with a single leaf gets no internal level: the leaf is the root.
fn write_internal_levels(
    pager: &mut PageManager,
    leaf_offsets: &[u64],
    smallest: &[Record],
    page_size: usize,
) -> Result<u64> {
    if leaf_offsets.len() == 1 {
        return Ok(leaf_offsets[0]);
    }

    let fanout = internal_fanout(&smallest[0], page_size);
    let mut level: Vec<(u64, Record)> = leaf_offsets
        .iter()
        .copied()
        .zip(smallest.iter().cloned())
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / fanout + 1);
        for group in level.chunks(fanout) {
            let node = InternalNode {
                keys: group[1..].iter().map(|(_, key)| key.clone()).collect(),
                children: group.iter().map(|(offset, _)| *offset).collect(),
            };
            let offset = pager.allocate_page();
            pager.write_page(offset, &Page::Internal(node))?;
            next.push((offset, group[0].1.clone()));
        }
        level = next;
    }
    Ok(level[0].0)
}

/// Derives the internal-node fanout from the measured on-page cost of the
/// first smallest key: `(page_size - overhead - one child offset) /
/// (key cost + child offset)`, clamped to at least 2.
fn internal_fanout(first_key: &Record, page_size: usize) -> usize {
    let overhead = 1 + 2 + 2;
    let key_cost = 4 + first_key.serialized_size();
    ((page_size - overhead - 8) / (key_cost + 8)).max(2)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
