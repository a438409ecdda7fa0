//! # Pager — fixed-size pages, paged file I/O, and the buffer cache
//!
//! Everything below the SSTable layer lives here:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ SSTable (build / search / scan / merge)       │
//! ├───────────────────────────────────────────────┤
//! │ PageManager   — one file, page-aligned I/O    │
//! │     │ read-through                            │
//! │     v                                         │
//! │ BufferPool    — bounded cache, LRU/CLOCK/RND  │
//! ├───────────────────────────────────────────────┤
//! │ Page          — internal / leaf / metadata    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! A [`Page`] is a fixed-size (default 4096 B) serialized container in one of
//! three variants; accessors on the wrong variant fail with
//! [`PagerError::InvalidPageKind`], and serialization that would exceed the
//! page size fails with [`PagerError::PageOverflow`] *before* anything is
//! written.
//!
//! The [`PageManager`] wraps a single file with page-aligned random access
//! and consults the [`BufferPool`] before touching disk. The pool is keyed by
//! `(file, offset)` so that two files never collide at equal offsets.

mod cache;
mod manager;
mod page;

pub use cache::{BufferPool, EvictionPolicy, PageKey};
pub use manager::{PageManager, DEFAULT_CACHE_CAPACITY};
pub use page::{InternalNode, LeafNode, Page, PageKind, SstMeta, DEFAULT_PAGE_SIZE};

use bloom::BloomError;
use record::RecordError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the page, cache, and file-manager layers.
#[derive(Debug, Error)]
pub enum PagerError {
    /// An underlying file operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A typed accessor was called on the wrong page variant.
    #[error("wrong page kind: expected {expected}, found {found}")]
    InvalidPageKind {
        expected: &'static str,
        found: &'static str,
    },

    /// A serialized page exceeded the fixed page size.
    #[error("serialized page is {size} bytes, exceeding the page size of {page_size}")]
    PageOverflow { size: usize, page_size: usize },

    /// A page or blob could not be parsed, or a page kind contradicts its
    /// position in the file.
    #[error("corrupt page data: {0}")]
    Corrupt(String),
}

impl From<RecordError> for PagerError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Io(io) => PagerError::Io(io),
            RecordError::Corrupt(msg) => PagerError::Corrupt(msg.to_string()),
        }
    }
}

impl From<BloomError> for PagerError {
    fn from(e: BloomError) -> Self {
        match e {
            BloomError::Io(io) => PagerError::Io(io),
            _ => PagerError::Corrupt(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PagerError>;

#[cfg(test)]
mod tests;
