//! # SSTable — Sorted String Table
//!
//! Immutable, on-disk storage files for the driftkv storage engine, laid out
//! as page-structured static B+-trees.
//!
//! When the in-memory memtable reaches its entry threshold the engine
//! flushes it to disk as an SSTable. SSTables are *write-once, read-many* —
//! once built they are never modified (only replaced during merges).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ offset 0                METADATA PAGE                          │
//! │   root_offset | leaf_begin | leaf_end | file_name              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ leaf_begin .. leaf_end  LEAF PAGES (contiguous, page-sized)    │
//! │                                                               │
//! │   entries sorted by key, per-leaf bloom filter,               │
//! │   next_leaf chaining each leaf to its successor (last = 0)    │
//! ├───────────────────────────────────────────────────────────────┤
//! │ > leaf_end              INTERNAL PAGES (bottom-up)             │
//! │                                                               │
//! │   separator keys + child offsets; the last page written       │
//! │   is the root (a single-leaf table's root is that leaf)       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All pages are exactly `page_size` bytes (default 4096). Construction is
//! bottom-up from an already-sorted stream: leaves are packed by a running
//! size budget, then internal levels are built over the per-leaf smallest
//! keys until a single root remains. The build arena is discarded as soon as
//! the file is durable; the long-lived [`SsTable`] handle owns only the
//! open file and its metadata offsets.
//!
//! Merging ([`merge`]) streams the leaf chains of two tables into a scratch
//! leaf file, resolving duplicate keys by the strictly newer sequence
//! number; [`SsTable::from_leaf_file`] then assembles a full table from the
//! scratch pages.

mod builder;
mod merge;
mod table;

pub use merge::{merge, MergeOutput};
pub use table::SsTable;

/// Bits per leaf bloom filter.
pub const LEAF_BLOOM_BITS: u64 = 1024;
/// Expected keys per leaf bloom filter.
pub const LEAF_BLOOM_KEYS: u64 = 100;

#[cfg(test)]
mod tests;
