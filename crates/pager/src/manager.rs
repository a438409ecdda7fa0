//! Paged random-access file I/O with a read-through buffer cache.

use crate::cache::{BufferPool, EvictionPolicy, PageKey};
use crate::page::Page;
use crate::{PagerError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default buffer-pool capacity in pages.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Wraps a single file with page-aligned reads and writes at a fixed page
/// size.
///
/// Offset 0 is reserved for the metadata page and is never handed out by
/// [`allocate_page`](Self::allocate_page). Reads go through the
/// [`BufferPool`] first; misses are read from disk, deserialized, and
/// installed. Writes are flushed eagerly and update the pool in place.
///
/// The file handle and the pool each sit behind a `Mutex` so reads work
/// through a shared reference (`&self`); all mutations of the allocation
/// cursor take `&mut self`.
#[derive(Debug)]
pub struct PageManager {
    path: PathBuf,
    /// Cache-key rendering of `path`; updated on reopen.
    file_key: String,
    file: Mutex<File>,
    page_size: usize,
    /// Next page-aligned offset past the end of the file.
    next_offset: u64,
    pool: Mutex<BufferPool>,
}

impl PageManager {
    /// Opens (or creates) a paged file.
    ///
    /// The allocation cursor starts at the first page-aligned offset past the
    /// current end of file, or at `page_size` for an empty file (offset 0 is
    /// the metadata page).
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        let next_offset = next_aligned(len, page_size);

        Ok(Self {
            file_key: path.to_string_lossy().into_owned(),
            path,
            file: Mutex::new(file),
            page_size,
            next_offset,
            pool: Mutex::new(BufferPool::new(
                DEFAULT_CACHE_CAPACITY,
                EvictionPolicy::Lru,
            )),
        })
    }

    /// Reserves the next page-aligned offset past the end of the file.
    pub fn allocate_page(&mut self) -> u64 {
        let offset = self.next_offset;
        self.next_offset += self.page_size as u64;
        offset
    }

    /// Reads the page at `offset`, consulting the buffer pool first.
    ///
    /// # Errors
    ///
    /// [`PagerError::Corrupt`] for unaligned or out-of-range offsets or an
    /// undecodable page; [`PagerError::Io`] for short reads and file errors.
    pub fn read_page(&self, offset: u64) -> Result<Arc<Page>> {
        if offset % self.page_size as u64 != 0 {
            return Err(PagerError::Corrupt(format!(
                "read at unaligned offset {offset}"
            )));
        }
        if offset >= self.next_offset {
            return Err(PagerError::Corrupt(format!(
                "read at offset {offset} past end of file ({})",
                self.next_offset
            )));
        }

        let key = PageKey {
            file: self.file_key.clone(),
            offset,
        };
        if let Some(page) = self.pool()?.get(&key) {
            return Ok(page);
        }

        let mut buf = vec![0u8; self.page_size];
        {
            let mut file = self.file()?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }
        let page = Arc::new(Page::deserialize(&buf)?);
        self.pool()?.put(key, Arc::clone(&page));
        Ok(page)
    }

    /// Serializes and writes a page, flushes the file, and installs (or
    /// replaces) the page in the pool.
    pub fn write_page(&mut self, offset: u64, page: &Page) -> Result<()> {
        let bytes = page.serialize(self.page_size)?;
        self.write_bytes(offset, &bytes)?;

        let key = PageKey {
            file: self.file_key.clone(),
            offset,
        };
        self.pool()?.put(key, Arc::new(page.clone()));
        Ok(())
    }

    /// Writes an already-serialized page verbatim, bypassing the pool.
    ///
    /// Used by the merge engine to copy finalized leaf pages into the scratch
    /// file without paying for deserialization or cache churn.
    pub fn write_raw(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.page_size {
            return Err(PagerError::Corrupt(format!(
                "raw write of {} bytes does not match page size {}",
                bytes.len(),
                self.page_size
            )));
        }
        self.write_bytes(offset, bytes)
    }

    /// First page-aligned offset past the end of the file.
    #[must_use]
    pub fn eof_offset(&self) -> u64 {
        self.next_offset
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of reads served from the buffer pool.
    pub fn cache_hits(&self) -> Result<u64> {
        Ok(self.pool()?.cache_hits())
    }

    /// Replaces the buffer pool with a fresh one of the given capacity and
    /// policy. Resident pages are dropped.
    pub fn configure_cache(&mut self, capacity: usize, policy: EvictionPolicy) -> Result<()> {
        *self.pool()? = BufferPool::new(capacity, policy);
        Ok(())
    }

    /// Reopens the manager against `new_path`. The file must already exist;
    /// the caller performs the filesystem rename first.
    pub fn reopen<P: AsRef<Path>>(&mut self, new_path: P) -> Result<()> {
        let new_path = new_path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&new_path)?;
        let len = file.metadata()?.len();

        self.next_offset = next_aligned(len, self.page_size);
        self.file_key = new_path.to_string_lossy().into_owned();
        self.path = new_path;
        *self.file()? = file;
        Ok(())
    }

    /// Flushes file contents and metadata to disk.
    pub fn sync(&self) -> Result<()> {
        self.file()?.sync_all()?;
        Ok(())
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.flush()?;
        drop(file);

        let end = offset + bytes.len() as u64;
        if end > self.next_offset {
            self.next_offset = next_aligned(end, self.page_size);
        }
        Ok(())
    }

    fn file(&self) -> Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| poisoned("page file lock poisoned"))
    }

    fn pool(&self) -> Result<MutexGuard<'_, BufferPool>> {
        self.pool
            .lock()
            .map_err(|_| poisoned("buffer pool lock poisoned"))
    }
}

fn poisoned(msg: &str) -> PagerError {
    PagerError::Io(io::Error::new(io::ErrorKind::Other, msg.to_string()))
}

/// Rounds `len` up to the next page boundary; an empty file starts past the
/// reserved metadata page.
fn next_aligned(len: u64, page_size: usize) -> u64 {
    let page_size = page_size as u64;
    let mut next = if len % page_size == 0 {
        len
    } else {
        len + page_size - len % page_size
    };
    if next == 0 {
        next = page_size;
    }
    next
}
