//! Write path: `put()`, `delete()`, the threshold flush, and the cascading
//! `merge_up()`.
//!
//! All mutations flow through this module. Each write is stamped with the
//! next sequence number and applied to the memtable; reaching the entry
//! threshold drains the memtable in sorted order into a fresh L1 SSTable and
//! hands it to `merge_up`, which cascades merges upward while levels
//! overflow their capacities.

use crate::{manifest, LsmTree, GROWTH_RATIO};
use anyhow::{anyhow, ensure, Context, Result};
use record::{FieldValue, Record};
use sstable::{merge, SsTable};
use std::fs;

impl LsmTree {
    /// Inserts a key-value pair.
    pub fn put(
        &mut self,
        key: impl Into<FieldValue>,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        self.put_record(Record::new(key, value))
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone carries a fresh sequence number and masks older
    /// versions of the key in every level until merges discard them.
    pub fn delete(&mut self, key: impl Into<FieldValue>) -> Result<()> {
        let mut record = Record::key_only(key);
        record.mark_tombstone();
        self.put_record(record)
    }

    /// Admits a record: assigns the next sequence number, inserts it into
    /// the memtable, and flushes when the threshold is reached.
    pub fn put_record(&mut self, mut record: Record) -> Result<()> {
        ensure!(!record.key.is_none(), "record key must be set");

        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| anyhow!("sequence number overflow (u64::MAX reached)"))?;
        record.seq = self.seq;

        self.mem.put(record);

        if self.mem.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes a non-empty memtable and saves the manifest atomically.
    ///
    /// After a successful close the tree is inert; further writes would
    /// still work but `Drop` will not save again. Reopen the directory to
    /// continue.
    pub fn close(&mut self) -> Result<()> {
        if !self.mem.is_empty() {
            self.flush()?;
        }

        let entries: Vec<manifest::LevelEntry> = self
            .level_max
            .iter()
            .enumerate()
            .map(|(idx, &capacity)| manifest::LevelEntry {
                level: idx as i32 + 1,
                file_name: self
                    .levels
                    .get(idx)
                    .and_then(|slot| slot.as_ref())
                    .map(|sst| sst.file_name())
                    .unwrap_or_default(),
                capacity,
            })
            .collect();
        manifest::save(&self.manifest_path(), &entries)?;

        self.closed = true;
        Ok(())
    }

    /// Drains the memtable in sorted order into a new L1 SSTable.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let records = self.mem.drain_sorted();
        if records.is_empty() {
            return Ok(());
        }

        let name = self.next_sst_name(1);
        let path = self.db_dir.join(&name);
        let sst = SsTable::build(&path, &records, self.page_size)
            .with_context(|| format!("failed to flush memtable to {}", path.display()))?;
        self.merge_up(1, sst)
    }

    /// Installs `sst` at `level`, merging with the resident table and
    /// cascading upward while the product overflows the level capacity.
    pub(crate) fn merge_up(&mut self, level: usize, sst: SsTable) -> Result<()> {
        let idx = level - 1;

        // Grow the level bookkeeping on demand, ratio 2 per level.
        while self.level_max.len() <= idx {
            let next = self
                .level_max
                .last()
                .map(|cap| cap * GROWTH_RATIO)
                .unwrap_or(self.mem.threshold() as u64);
            self.level_max.push(next);
        }
        while self.levels.len() <= idx {
            self.levels.push(None);
        }

        let Some(existing) = self.levels[idx].take() else {
            // Empty target level: promote the table under a level-local name.
            let name = self.next_sst_name(level);
            let new_path = self.db_dir.join(&name);
            let mut sst = sst;
            fs::rename(sst.path(), &new_path).with_context(|| {
                format!("failed to promote sstable into level {level} at {name}")
            })?;
            sst.rename(&new_path)?;
            self.levels[idx] = Some(sst);
            return Ok(());
        };

        let name = self.next_sst_name(level);
        let merged_path = self.db_dir.join(&name);
        let scratch_path = self.db_dir.join(format!("merge_{name}.leafs"));

        let output = merge(&existing, &sst, &scratch_path)
            .with_context(|| format!("failed to merge into level {level}"))?;
        let merged = SsTable::from_leaf_file(
            &merged_path,
            &scratch_path,
            &output.smallest_keys,
            output.num_pages,
            output.num_entries,
            self.page_size,
        )?;

        // Both sources are fully consumed: release the handles, then delete
        // their files exactly once, along with the scratch file.
        let old_existing = existing.path().to_path_buf();
        let old_incoming = sst.path().to_path_buf();
        drop(existing);
        drop(sst);
        fs::remove_file(&old_existing)
            .with_context(|| format!("failed to delete {}", old_existing.display()))?;
        fs::remove_file(&old_incoming)
            .with_context(|| format!("failed to delete {}", old_incoming.display()))?;
        fs::remove_file(&scratch_path)
            .with_context(|| format!("failed to delete {}", scratch_path.display()))?;

        if merged.num_entries() > self.level_max[idx] {
            self.merge_up(level + 1, merged)
        } else {
            self.levels[idx] = Some(merged);
            Ok(())
        }
    }

    /// `L<level>_SSTable_<counter>.sst`, counter monotonic per process and
    /// resumed from the manifest on reopen.
    fn next_sst_name(&mut self, level: usize) -> String {
        let counter = self.sst_counter;
        self.sst_counter += 1;
        format!("L{level}_SSTable_{counter}.sst")
    }
}
