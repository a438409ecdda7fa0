//! Binary level manifest (`manifest.lsm`).
//!
//! Rewritten atomically at clean close and reloaded at open, the manifest
//! records the full level layout so a reopened database reconstructs its
//! tree exactly.
//!
//! ## File format
//!
//! Packed little-endian binary:
//!
//! ```text
//! u64  num_levels
//! per level:
//!   i32  level_index            (1-based)
//!   u64  file_name_length       (0 for an empty level)
//!   ...  file_name bytes
//!   u64  level_capacity         (entries; level 1 == memtable threshold)
//! ```
//!
//! ## Crash safety
//!
//! Saves write to `manifest.lsm.tmp`, fsync, then rename over the previous
//! manifest, so a crash mid-save leaves the old manifest intact.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Manifest file name inside the database directory.
pub const MANIFEST_FILENAME: &str = "manifest.lsm";

/// Parse-time sanity caps; anything beyond these means a damaged file.
const MAX_LEVELS: u64 = 1 << 16;
const MAX_NAME_BYTES: u64 = 4096;

/// One level's manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    /// 1-based level index.
    pub level: i32,
    /// SSTable basename, empty when the level holds no table.
    pub file_name: String,
    /// Level capacity in entries.
    pub capacity: u64,
}

/// Reads the manifest at `path`.
pub fn load(path: &Path) -> Result<Vec<LevelEntry>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open manifest at {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let num_levels = reader
        .read_u64::<LittleEndian>()
        .context("corrupt manifest: missing level count")?;
    if num_levels > MAX_LEVELS {
        bail!("corrupt manifest: implausible level count {num_levels}");
    }

    let mut entries = Vec::with_capacity(num_levels as usize);
    for idx in 0..num_levels {
        let level = reader
            .read_i32::<LittleEndian>()
            .with_context(|| format!("corrupt manifest: truncated level {idx}"))?;
        let name_len = reader
            .read_u64::<LittleEndian>()
            .with_context(|| format!("corrupt manifest: truncated level {idx}"))?;
        if name_len > MAX_NAME_BYTES {
            bail!("corrupt manifest: file name of {name_len} bytes at level {idx}");
        }
        let mut name_bytes = vec![0u8; name_len as usize];
        reader
            .read_exact(&mut name_bytes)
            .with_context(|| format!("corrupt manifest: truncated level {idx}"))?;
        let file_name = String::from_utf8(name_bytes)
            .map_err(|_| anyhow::anyhow!("corrupt manifest: file name is not utf-8"))?;
        let capacity = reader
            .read_u64::<LittleEndian>()
            .with_context(|| format!("corrupt manifest: truncated level {idx}"))?;

        entries.push(LevelEntry {
            level,
            file_name,
            capacity,
        });
    }
    Ok(entries)
}

/// Writes the manifest atomically: tmp file, fsync, rename.
pub fn save(path: &Path, entries: &[LevelEntry]) -> Result<()> {
    let tmp_path = path.with_extension("lsm.tmp");
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create manifest tmp at {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);

        writer.write_u64::<LittleEndian>(entries.len() as u64)?;
        for entry in entries {
            writer.write_i32::<LittleEndian>(entry.level)?;
            writer.write_u64::<LittleEndian>(entry.file_name.len() as u64)?;
            writer.write_all(entry.file_name.as_bytes())?;
            writer.write_u64::<LittleEndian>(entry.capacity)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to install manifest at {}", path.display()))?;
    Ok(())
}
