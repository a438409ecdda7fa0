use anyhow::{bail, Result};
use pager::{EvictionPolicy, Page, PageManager};
use record::{FieldValue, Record};
use std::path::{Path, PathBuf};

/// Read handle over one immutable SSTable file.
///
/// Opened against a file whose offset 0 holds the metadata page. All reads
/// go through the [`PageManager`]'s buffer pool; `search` and `scan` take
/// `&self`, so concurrent readers only contend on the pool and file locks.
pub struct SsTable {
    pub(crate) path: PathBuf,
    pub(crate) pager: PageManager,
    pub(crate) root_offset: u64,
    pub(crate) leaf_begin: u64,
    pub(crate) leaf_end: u64,
    pub(crate) num_entries: u64,
    pub(crate) max_seq: u64,
}

impl SsTable {
    /// Opens an existing SSTable file.
    ///
    /// Reads the metadata page at offset 0 and recovers `num_entries` and
    /// `max_seq` with one walk of the leaf chain (the metadata page stores
    /// neither; the engine needs the maximum sequence number to continue its
    /// write counter after reopening a database).
    ///
    /// # Errors
    ///
    /// Fails if offset 0 does not hold a metadata page, if the leaf chain is
    /// malformed, or on I/O errors.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pager = PageManager::open(&path, page_size)?;

        let meta_page = pager.read_page(0)?;
        let meta = match &*meta_page {
            Page::Metadata(meta) => meta.clone(),
            other => bail!(
                "not an sstable: offset 0 holds a {} page",
                other.kind().name()
            ),
        };

        let mut num_entries = 0u64;
        let mut max_seq = 0u64;
        let mut offset = meta.leaf_begin;
        let total_pages = pager.eof_offset() / page_size as u64;
        let mut walked = 0u64;
        while offset != 0 {
            walked += 1;
            if walked > total_pages {
                bail!("corrupt sstable: leaf chain does not terminate");
            }
            let page = pager.read_page(offset)?;
            let leaf = match &*page {
                Page::Leaf(leaf) => leaf,
                other => bail!(
                    "corrupt sstable: leaf chain reached a {} page",
                    other.kind().name()
                ),
            };
            num_entries += leaf.entries.len() as u64;
            for entry in &leaf.entries {
                max_seq = max_seq.max(entry.seq);
            }
            offset = leaf.next_leaf;
        }

        Ok(Self {
            path,
            pager,
            root_offset: meta.root_offset,
            leaf_begin: meta.leaf_begin,
            leaf_end: meta.leaf_end,
            num_entries,
            max_seq,
        })
    }

    /// Point lookup.
    ///
    /// Descends from the root to the candidate leaf, probes the leaf's bloom
    /// filter, and binary-searches the entries. Returns a copy of the stored
    /// record (which may be a tombstone) or `None`.
    pub fn search(&self, key: &FieldValue) -> Result<Option<Record>> {
        if self.num_entries == 0 {
            return Ok(None);
        }
        let leaf_offset = self.find_leaf(key)?;
        let page = self.pager.read_page(leaf_offset)?;
        let leaf = match &*page {
            Page::Leaf(leaf) => leaf,
            other => bail!(
                "corrupt sstable: search reached a {} page",
                other.kind().name()
            ),
        };

        // Fast path: the filter saying "not here" is definitive.
        if let Some(bf) = &leaf.bloom {
            if !bf.possibly_contains_key(key) {
                return Ok(None);
            }
        }

        Ok(leaf
            .entries
            .binary_search_by(|entry| entry.key.cmp(key))
            .ok()
            .map(|idx| leaf.entries[idx].clone()))
    }

    /// Range scan over `start <= key <= end`.
    ///
    /// Descends by `start` to the first candidate leaf, then walks the leaf
    /// chain emitting every entry in range, stopping at the first entry past
    /// `end`. Tombstones are emitted; the coordinator's merge layer strips
    /// them after duplicate resolution.
    pub fn scan(&self, start: &FieldValue, end: &FieldValue) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        if self.num_entries == 0 || start > end {
            return Ok(out);
        }

        let mut offset = self.find_leaf(start)?;
        'chain: while offset != 0 {
            let page = self.pager.read_page(offset)?;
            let leaf = match &*page {
                Page::Leaf(leaf) => leaf,
                other => bail!(
                    "corrupt sstable: leaf chain reached a {} page",
                    other.kind().name()
                ),
            };
            for entry in &leaf.entries {
                if entry.key > *end {
                    break 'chain;
                }
                if entry.key >= *start {
                    out.push(entry.clone());
                }
            }
            offset = leaf.next_leaf;
        }
        Ok(out)
    }

    /// Re-points the handle at `new_path` after the caller has renamed the
    /// file on disk (level promotion during merges).
    pub fn rename<P: AsRef<Path>>(&mut self, new_path: P) -> Result<()> {
        self.pager.reopen(&new_path)?;
        self.path = new_path.as_ref().to_path_buf();
        Ok(())
    }

    /// Replaces the table's buffer pool with one of the given capacity and
    /// policy.
    pub fn configure_cache(&mut self, capacity: usize, policy: EvictionPolicy) -> Result<()> {
        self.pager.configure_cache(capacity, policy)?;
        Ok(())
    }

    /// Reads served from this table's buffer pool.
    pub fn cache_hits(&self) -> Result<u64> {
        Ok(self.pager.cache_hits()?)
    }

    #[must_use]
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Highest sequence number stored in the table.
    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename recorded in the manifest.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Walks internal nodes from the root down to the leaf that would hold
    /// `key`.
    ///
    /// Child `i` of an internal node covers keys strictly less than
    /// `keys[i]` (each separator is the smallest key under the child to its
    /// right), so the descent takes the first child whose separator is
    /// strictly greater than `key`, or the last child.
    fn find_leaf(&self, key: &FieldValue) -> Result<u64> {
        let mut offset = self.root_offset;
        loop {
            let page = self.pager.read_page(offset)?;
            match &*page {
                Page::Internal(node) => {
                    if node.children.len() != node.keys.len() + 1 {
                        bail!(
                            "corrupt internal node: {} keys, {} children",
                            node.keys.len(),
                            node.children.len()
                        );
                    }
                    let mut idx = 0;
                    while idx < node.keys.len() && *key >= node.keys[idx].key {
                        idx += 1;
                    }
                    offset = node.children[idx];
                }
                Page::Leaf(_) => return Ok(offset),
                Page::Metadata(_) => {
                    bail!("corrupt sstable: tree traversal reached a metadata page")
                }
            }
        }
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("path", &self.path)
            .field("root_offset", &self.root_offset)
            .field("leaf_begin", &self.leaf_begin)
            .field("leaf_end", &self.leaf_end)
            .field("num_entries", &self.num_entries)
            .field("max_seq", &self.max_seq)
            .finish()
    }
}
