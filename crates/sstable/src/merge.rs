//! Streaming two-way merge of SSTable leaf chains.
//!
//! Produces a sorted leaf-page scratch file from two input tables. When the
//! same key appears in both inputs, only the record with the **strictly
//! higher sequence number** is emitted (newest wins); tombstones survive the
//! merge with their sequence numbers; only the read paths mask them.
//!
//! This is the core primitive for compaction: the coordinator feeds the
//! scratch file and the returned smallest-key vector to
//! [`SsTable::from_leaf_file`] to assemble the merged table.
//!
//! Memory stays bounded by two leaf buffers plus the leaf being packed;
//! the merge never materializes either input.

use crate::builder::LeafBuilder;
use crate::table::SsTable;
use anyhow::{anyhow, bail, ensure, Result};
use pager::{LeafNode, Page, PageManager, SstMeta};
use record::Record;
use std::path::Path;

/// Everything the SSTable assembly step needs about a merge product.
#[derive(Debug)]
pub struct MergeOutput {
    /// Smallest key of each output leaf, in leaf order.
    pub smallest_keys: Vec<Record>,
    /// Leaf pages written to the scratch file.
    pub num_pages: u64,
    /// Records emitted after duplicate resolution.
    pub num_entries: u64,
}

/// Reads one SSTable's leaf chain a page at a time.
struct LeafCursor<'a> {
    table: &'a SsTable,
    entries: Vec<Record>,
    pos: usize,
    next_offset: u64,
}

impl<'a> LeafCursor<'a> {
    fn new(table: &'a SsTable) -> Result<Self> {
        let mut cursor = Self {
            table,
            entries: Vec::new(),
            pos: 0,
            next_offset: if table.num_entries == 0 {
                0
            } else {
                table.leaf_begin
            },
        };
        cursor.refill()?;
        Ok(cursor)
    }

    /// Loads leaf pages until an unconsumed entry is buffered or the chain
    /// ends.
    fn refill(&mut self) -> Result<()> {
        while self.pos >= self.entries.len() && self.next_offset != 0 {
            let page = self.table.pager.read_page(self.next_offset)?;
            let leaf = match &*page {
                Page::Leaf(leaf) => leaf,
                other => bail!(
                    "corrupt sstable: leaf chain reached a {} page",
                    other.kind().name()
                ),
            };
            self.entries = leaf.entries.clone();
            self.pos = 0;
            self.next_offset = leaf.next_leaf;
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Record> {
        self.entries.get(self.pos)
    }

    fn take(&mut self) -> Result<Record> {
        let record = self
            .entries
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("merge cursor advanced past its end"))?;
        self.pos += 1;
        self.refill()?;
        Ok(record)
    }
}

#[derive(Clone, Copy)]
enum Pick {
    A,
    B,
    Both,
}

/// Merges the leaf chains of `a` and `b` into a scratch leaf file at
/// `leaf_path`.
///
/// The scratch file reserves page 0 (a placeholder metadata page, matching
/// the page manager's allocation discipline); output leaves are packed with
/// the standard running budget and per-leaf bloom filters and written raw at
/// `page_size × [1..]`. Chain links are left for the assembly step, which
/// rewrites them anyway.
pub fn merge<P: AsRef<Path>>(a: &SsTable, b: &SsTable, leaf_path: P) -> Result<MergeOutput> {
    ensure!(
        a.pager.page_size() == b.pager.page_size(),
        "cannot merge sstables with different page sizes"
    );
    let page_size = a.pager.page_size();

    let mut out = PageManager::open(leaf_path, page_size)?;
    out.write_page(0, &Page::Metadata(SstMeta::default()))?;

    let mut cursor_a = LeafCursor::new(a)?;
    let mut cursor_b = LeafCursor::new(b)?;
    let mut builder = LeafBuilder::new(page_size)?;
    let mut output = MergeOutput {
        smallest_keys: Vec::new(),
        num_pages: 0,
        num_entries: 0,
    };

    loop {
        let pick = match (cursor_a.peek(), cursor_b.peek()) {
            (None, None) => break,
            (Some(_), None) => Pick::A,
            (None, Some(_)) => Pick::B,
            (Some(x), Some(y)) => {
                if x.key < y.key {
                    Pick::A
                } else if y.key < x.key {
                    Pick::B
                } else {
                    Pick::Both
                }
            }
        };

        let record = match pick {
            Pick::A => cursor_a.take()?,
            Pick::B => cursor_b.take()?,
            Pick::Both => {
                // Same key in both inputs: the strictly newer write survives.
                // Equal sequence numbers cannot occur under a single writer.
                let left = cursor_a.take()?;
                let right = cursor_b.take()?;
                if left.seq > right.seq {
                    left
                } else {
                    right
                }
            }
        };

        output.num_entries += 1;
        if let Some(full) = builder.push(record)? {
            flush_leaf(&mut out, full, &mut output)?;
        }
    }
    if let Some(trailing) = builder.finish() {
        flush_leaf(&mut out, trailing, &mut output)?;
    }
    out.sync()?;

    Ok(output)
}

fn flush_leaf(out: &mut PageManager, leaf: LeafNode, output: &mut MergeOutput) -> Result<()> {
    let smallest = leaf
        .entries
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("merge produced an empty leaf"))?;
    let offset = out.allocate_page();
    let bytes = Page::Leaf(leaf).serialize(out.page_size())?;
    out.write_raw(offset, &bytes)?;
    output.smallest_keys.push(smallest);
    output.num_pages += 1;
    Ok(())
}
