//! # Engine - driftkv LSM coordinator
//!
//! The central orchestrator tying the [`memtable`], [`sstable`], and
//! [`pager`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                  LSM TREE                     │
//! │                                               │
//! │ write.rs → Memtable insert                    │
//! │              |                                │
//! │              |  (entry threshold reached?)    │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new L1 SSTable            │
//! │              |                                │
//! │              |  (level over capacity?)        │
//! │              |            yes                 │
//! │              v                                │
//! │         merge_up() → merged SSTable,          │
//! │                      cascading to L+1         │
//! │                                               │
//! │ read.rs → Memtable → L1 → L2 → …              │
//! │            (first match wins)                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Levels
//!
//! The memtable is level 0. Each on-disk level holds **at most one** SSTable;
//! capacities grow by a fixed ratio (`C_1 = T_mem`, `C_{i+1} = C_i × 2`).
//! A flush always lands at L1; a level over capacity merges into the level
//! above, recursively, so cold data drifts toward the bottom of the tree.
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | `lib.rs`     | `LsmTree` struct, open/recovery, accessors, `Drop`     |
//! | [`write`]    | `put()`, `delete()`, flush, cascading `merge_up()`     |
//! | [`read`]     | `get()`, `scan()` (k-way heap merge + dedup)           |
//! | [`manifest`] | Binary `manifest.lsm` level layout (atomic rewrite)    |
//!
//! ## Durability
//!
//! There is no write-ahead log: only cleanly-closed state is recoverable.
//! [`LsmTree::close`] flushes a non-empty memtable and atomically rewrites
//! the manifest; [`LsmTree::open`] reloads it and reopens every referenced
//! SSTable (a missing file is a corrupt manifest). Dropping the tree closes
//! it best-effort, logging on failure.
//!
//! ## Concurrency
//!
//! Single writer, shared readers: `put`/`delete`/`close` take `&mut self`,
//! `get`/`scan` take `&self`. Rust's borrow discipline is the level-handle
//! snapshot: a reader holding `&self` can never observe a level whose file
//! a concurrent merge has deleted, because merges require `&mut self`.

mod manifest;
mod read;
mod write;

pub use pager::{EvictionPolicy, DEFAULT_PAGE_SIZE};
pub use record::{FieldValue, Record};

use anyhow::{bail, Context, Result};
use memtable::Memtable;
use sstable::SsTable;
use std::path::{Path, PathBuf};

/// Capacity growth ratio between adjacent levels.
pub const GROWTH_RATIO: u64 = 2;

/// The LSM-tree coordinator: one memtable plus an ordered run of on-disk
/// levels, each holding at most one SSTable.
pub struct LsmTree {
    pub(crate) mem: Memtable,
    /// `levels[0]` is L1.
    pub(crate) levels: Vec<Option<SsTable>>,
    /// Per-level entry capacities; `level_max[0] = T_mem`, ratio 2 upward.
    pub(crate) level_max: Vec<u64>,
    pub(crate) db_dir: PathBuf,
    /// Last sequence number handed out.
    pub(crate) seq: u64,
    /// Monotonic counter for SSTable file names.
    pub(crate) sst_counter: u64,
    pub(crate) page_size: usize,
    pub(crate) closed: bool,
}

impl LsmTree {
    /// Opens a database directory with the default page size.
    ///
    /// `mem_threshold` is the memtable flush threshold in entries and also
    /// the capacity of L1.
    pub fn open<P: AsRef<Path>>(db_dir: P, mem_threshold: usize) -> Result<Self> {
        Self::open_with_page_size(db_dir, mem_threshold, DEFAULT_PAGE_SIZE)
    }

    /// Opens a database directory, creating it if needed.
    ///
    /// When `manifest.lsm` exists the level layout is restored from it:
    /// every referenced SSTable is reopened (a missing file fails with a
    /// corrupt-manifest error), the write sequence resumes past the highest
    /// stored sequence number, and the file-name counter resumes past the
    /// highest parsed counter.
    pub fn open_with_page_size<P: AsRef<Path>>(
        db_dir: P,
        mem_threshold: usize,
        page_size: usize,
    ) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("failed to create database directory {}", db_dir.display()))?;

        let mut tree = Self {
            mem: Memtable::new(mem_threshold),
            levels: Vec::new(),
            level_max: Vec::new(),
            db_dir,
            seq: 0,
            sst_counter: 0,
            page_size,
            closed: false,
        };

        let manifest_path = tree.manifest_path();
        if manifest_path.exists() {
            for entry in manifest::load(&manifest_path)? {
                tree.level_max.push(entry.capacity);
                if entry.file_name.is_empty() {
                    tree.levels.push(None);
                    continue;
                }
                let sst_path = tree.db_dir.join(&entry.file_name);
                if !sst_path.exists() {
                    bail!(
                        "corrupt manifest: level {} references missing sstable {}",
                        entry.level,
                        entry.file_name
                    );
                }
                let sst = SsTable::open(&sst_path, page_size)
                    .with_context(|| format!("failed to open sstable {}", entry.file_name))?;
                tree.seq = tree.seq.max(sst.max_seq());
                if let Some(counter) = parse_sst_counter(&entry.file_name) {
                    tree.sst_counter = tree.sst_counter.max(counter + 1);
                }
                tree.levels.push(Some(sst));
            }
        }

        Ok(tree)
    }

    /// Number of levels including the memtable.
    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.level_max.len() + 1
    }

    /// Last sequence number assigned to a write.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// SSTable file name per level (L1 first), `None` for empty levels.
    #[must_use]
    pub fn level_file_names(&self) -> Vec<Option<String>> {
        self.levels
            .iter()
            .map(|slot| slot.as_ref().map(|sst| sst.file_name()))
            .collect()
    }

    /// Reconfigures the buffer pool of every open SSTable.
    pub fn configure_cache(&mut self, capacity: usize, policy: EvictionPolicy) -> Result<()> {
        for sst in self.levels.iter_mut().flatten() {
            sst.configure_cache(capacity, policy)?;
        }
        Ok(())
    }

    /// Cache hits summed over every open SSTable.
    pub fn total_cache_hits(&self) -> Result<u64> {
        let mut total = 0;
        for sst in self.levels.iter().flatten() {
            total += sst.cache_hits()?;
        }
        Ok(total)
    }

    pub(crate) fn manifest_path(&self) -> PathBuf {
        self.db_dir.join(manifest::MANIFEST_FILENAME)
    }
}

impl std::fmt::Debug for LsmTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsmTree")
            .field("db_dir", &self.db_dir)
            .field("seq", &self.seq)
            .field("memtable_entries", &self.mem.len())
            .field("memtable_threshold", &self.mem.threshold())
            .field("levels", &self.level_file_names())
            .field("level_max", &self.level_max)
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Save-state failures must not prevent shutdown; they are logged and
/// swallowed. The data already flushed to SSTables is unaffected.
impl Drop for LsmTree {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("failed to save lsm tree state on drop: {e:#}");
            }
        }
    }
}

/// Extracts the counter from `L<level>_SSTable_<counter>.sst` names.
fn parse_sst_counter(file_name: &str) -> Option<u64> {
    file_name
        .strip_suffix(".sst")?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests;
