//! Fixed-size page container in three variants.
//!
//! Every page begins with a one-byte kind tag and always occupies exactly
//! `page_size` bytes on disk (serialization pads with zeros). The three
//! variants:
//!
//! - **Internal node**: separator keys plus child page offsets
//!   (`children.len() == keys.len() + 1`; child `i` covers keys strictly
//!   less than `keys[i]`, the last child covers the rest).
//! - **Leaf node**: sorted record entries, a `next_leaf` offset chaining
//!   leaves in key order (0 = terminus), and an optional bloom filter built
//!   over exactly the stored keys.
//! - **SST metadata**: root/leaf-range offsets plus the file name; lives
//!   exclusively at offset 0 of every SSTable file.

use crate::{PagerError, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use record::Record;
use std::io::{Cursor, Read};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

const KIND_INTERNAL: u8 = 0;
const KIND_LEAF: u8 = 1;
const KIND_METADATA: u8 = 2;

/// Cap on the metadata file-name length; anything larger means corruption.
const MAX_NAME_BYTES: usize = 4096;

/// Cap on one serialized record; a record can never outgrow the page that
/// holds it, so anything larger means corruption.
const MAX_RECORD_BYTES: usize = 256 * 1024;

/// Discriminates the three page variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Internal,
    Leaf,
    Metadata,
}

impl PageKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PageKind::Internal => "internal",
            PageKind::Leaf => "leaf",
            PageKind::Metadata => "metadata",
        }
    }
}

/// Separator keys and child offsets of one internal B+-tree node.
#[derive(Debug, Clone, Default)]
pub struct InternalNode {
    /// Separator keys; `keys[i]` is the smallest key reachable under
    /// `children[i + 1]`.
    pub keys: Vec<Record>,
    /// Child page offsets; always one more than `keys`.
    pub children: Vec<u64>,
}

/// Sorted entries of one leaf node plus the next-leaf chain link.
#[derive(Debug, Clone)]
pub struct LeafNode {
    /// Entries in strictly ascending key order.
    pub entries: Vec<Record>,
    /// Offset of the next leaf in key order; 0 marks the last leaf.
    pub next_leaf: u64,
    /// Membership filter over exactly the keys in `entries`.
    pub bloom: Option<BloomFilter>,
}

impl LeafNode {
    #[must_use]
    pub fn new(bloom: Option<BloomFilter>) -> Self {
        Self {
            entries: Vec::new(),
            next_leaf: 0,
            bloom,
        }
    }

    /// On-page cost of one entry: seq (8) + tombstone (1) + length prefix (4)
    /// + record bytes.
    #[must_use]
    pub fn entry_size(record: &Record) -> usize {
        8 + 1 + 4 + record.serialized_size()
    }

    /// Serialized overhead of this leaf excluding entries; see
    /// [`Page::base_size`].
    #[must_use]
    pub fn base_size(&self) -> usize {
        1 + 2 + 8 + 1 + self.bloom.as_ref().map_or(0, |b| 4 + b.serialized_size())
    }

    /// Appends a record and registers its key in the bloom filter.
    pub fn push(&mut self, record: Record) {
        if let Some(bf) = &mut self.bloom {
            bf.add(&record);
        }
        self.entries.push(record);
    }
}

/// Contents of the metadata page at offset 0 of an SSTable file.
#[derive(Debug, Clone, Default)]
pub struct SstMeta {
    /// Offset of the root page (may be a leaf when the table has one leaf).
    pub root_offset: u64,
    /// First leaf page offset; 0 when the table holds no leaves.
    pub leaf_begin: u64,
    /// Last leaf page offset, inclusive.
    pub leaf_end: u64,
    /// File name recorded at build time.
    pub file_name: String,
    /// Optional table-wide filter.
    pub bloom: Option<BloomFilter>,
}

/// A fixed-size on-disk page.
#[derive(Debug, Clone)]
pub enum Page {
    Internal(InternalNode),
    Leaf(LeafNode),
    Metadata(SstMeta),
}

impl Page {
    #[must_use]
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Internal(_) => PageKind::Internal,
            Page::Leaf(_) => PageKind::Leaf,
            Page::Metadata(_) => PageKind::Metadata,
        }
    }

    pub fn internal(&self) -> Result<&InternalNode> {
        match self {
            Page::Internal(node) => Ok(node),
            other => Err(wrong_kind(PageKind::Internal, other.kind())),
        }
    }

    pub fn leaf(&self) -> Result<&LeafNode> {
        match self {
            Page::Leaf(node) => Ok(node),
            other => Err(wrong_kind(PageKind::Leaf, other.kind())),
        }
    }

    pub fn metadata(&self) -> Result<&SstMeta> {
        match self {
            Page::Metadata(meta) => Ok(meta),
            other => Err(wrong_kind(PageKind::Metadata, other.kind())),
        }
    }

    /// Exact serialized overhead of this variant, excluding per-entry costs.
    ///
    /// Packers combine this with [`LeafNode::entry_size`] to maintain a
    /// running budget without trial serialization. For leaves the figure
    /// includes the bloom blob, whose size is fixed once the filter exists.
    #[must_use]
    pub fn base_size(&self) -> usize {
        match self {
            // kind + num_keys (u16) + num_children (u16)
            Page::Internal(_) => 1 + 2 + 2,
            // kind + num_entries (u16) + next_leaf (u64) + has_bloom (u8)
            Page::Leaf(node) => node.base_size(),
            // kind + 3 offsets + name_len (u32) + name + has_bloom (u8)
            Page::Metadata(meta) => {
                1 + 24
                    + 4
                    + meta.file_name.len()
                    + 1
                    + meta.bloom.as_ref().map_or(0, |b| 4 + b.serialized_size())
            }
        }
    }

    /// Serializes the page, padding to exactly `page_size` bytes.
    ///
    /// # Errors
    ///
    /// [`PagerError::PageOverflow`] if the serialized form would exceed
    /// `page_size`, detected before any byte reaches disk.
    pub fn serialize(&self, page_size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(page_size);
        buf.push(match self {
            Page::Internal(_) => KIND_INTERNAL,
            Page::Leaf(_) => KIND_LEAF,
            Page::Metadata(_) => KIND_METADATA,
        });

        match self {
            Page::Internal(node) => {
                buf.extend_from_slice(&(node.keys.len() as u16).to_le_bytes());
                buf.extend_from_slice(&(node.children.len() as u16).to_le_bytes());
                for child in &node.children {
                    buf.extend_from_slice(&child.to_le_bytes());
                }
                for key in &node.keys {
                    let bytes = key.to_bytes();
                    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    buf.extend_from_slice(&bytes);
                }
            }
            Page::Leaf(node) => {
                buf.extend_from_slice(&(node.entries.len() as u16).to_le_bytes());
                for entry in &node.entries {
                    buf.extend_from_slice(&entry.seq.to_le_bytes());
                    buf.push(entry.tombstone as u8);
                    let bytes = entry.to_bytes();
                    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    buf.extend_from_slice(&bytes);
                }
                buf.extend_from_slice(&node.next_leaf.to_le_bytes());
                write_bloom(&mut buf, node.bloom.as_ref());
            }
            Page::Metadata(meta) => {
                buf.extend_from_slice(&meta.root_offset.to_le_bytes());
                buf.extend_from_slice(&meta.leaf_begin.to_le_bytes());
                buf.extend_from_slice(&meta.leaf_end.to_le_bytes());
                buf.extend_from_slice(&(meta.file_name.len() as u32).to_le_bytes());
                buf.extend_from_slice(meta.file_name.as_bytes());
                write_bloom(&mut buf, meta.bloom.as_ref());
            }
        }

        if buf.len() > page_size {
            return Err(PagerError::PageOverflow {
                size: buf.len(),
                page_size,
            });
        }
        buf.resize(page_size, 0);
        Ok(buf)
    }

    /// Parses a page from a full page-sized buffer.
    ///
    /// # Errors
    ///
    /// [`PagerError::Corrupt`] for an unknown kind tag, a truncated
    /// structure, or an undecodable record/bloom blob.
    pub fn deserialize(buf: &[u8]) -> Result<Page> {
        Self::parse(buf).map_err(|e| match e {
            // A structure running off the end of the buffer is damage, not
            // an I/O failure.
            PagerError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                PagerError::Corrupt("page structure is truncated".to_string())
            }
            other => other,
        })
    }

    fn parse(buf: &[u8]) -> Result<Page> {
        let mut cursor = Cursor::new(buf);
        let kind = cursor.read_u8()?;
        match kind {
            KIND_INTERNAL => {
                let num_keys = cursor.read_u16::<LittleEndian>()? as usize;
                let num_children = cursor.read_u16::<LittleEndian>()? as usize;
                let mut children = Vec::with_capacity(num_children);
                for _ in 0..num_children {
                    children.push(cursor.read_u64::<LittleEndian>()?);
                }
                let mut keys = Vec::with_capacity(num_keys);
                for _ in 0..num_keys {
                    keys.push(read_record(&mut cursor)?);
                }
                if children.len() != keys.len() + 1 {
                    return Err(PagerError::Corrupt(format!(
                        "internal node has {} keys but {} children",
                        keys.len(),
                        children.len()
                    )));
                }
                Ok(Page::Internal(InternalNode { keys, children }))
            }
            KIND_LEAF => {
                let num_entries = cursor.read_u16::<LittleEndian>()? as usize;
                let mut entries = Vec::with_capacity(num_entries);
                for _ in 0..num_entries {
                    let seq = cursor.read_u64::<LittleEndian>()?;
                    let tombstone = cursor.read_u8()? != 0;
                    let mut record = read_record(&mut cursor)?;
                    record.seq = seq;
                    record.tombstone = tombstone;
                    entries.push(record);
                }
                let next_leaf = cursor.read_u64::<LittleEndian>()?;
                let bloom = read_bloom(&mut cursor)?;
                Ok(Page::Leaf(LeafNode {
                    entries,
                    next_leaf,
                    bloom,
                }))
            }
            KIND_METADATA => {
                let root_offset = cursor.read_u64::<LittleEndian>()?;
                let leaf_begin = cursor.read_u64::<LittleEndian>()?;
                let leaf_end = cursor.read_u64::<LittleEndian>()?;
                let name_len = cursor.read_u32::<LittleEndian>()? as usize;
                if name_len > MAX_NAME_BYTES {
                    return Err(PagerError::Corrupt(
                        "metadata file name exceeds maximum".to_string(),
                    ));
                }
                let mut name_bytes = vec![0u8; name_len];
                cursor.read_exact(&mut name_bytes)?;
                let file_name = String::from_utf8(name_bytes)
                    .map_err(|_| PagerError::Corrupt("metadata file name is not utf-8".into()))?;
                let bloom = read_bloom(&mut cursor)?;
                Ok(Page::Metadata(SstMeta {
                    root_offset,
                    leaf_begin,
                    leaf_end,
                    file_name,
                    bloom,
                }))
            }
            other => Err(PagerError::Corrupt(format!("unknown page kind {other}"))),
        }
    }
}

fn wrong_kind(expected: PageKind, found: PageKind) -> PagerError {
    PagerError::InvalidPageKind {
        expected: expected.name(),
        found: found.name(),
    }
}

fn write_bloom(buf: &mut Vec<u8>, bloom: Option<&BloomFilter>) {
    match bloom {
        Some(bf) => {
            buf.push(1);
            let blob = bf.to_bytes();
            buf.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            buf.extend_from_slice(&blob);
        }
        None => buf.push(0),
    }
}

fn read_bloom(cursor: &mut Cursor<&[u8]>) -> Result<Option<BloomFilter>> {
    if cursor.read_u8()? == 0 {
        return Ok(None);
    }
    let blob_len = cursor.read_u32::<LittleEndian>()? as usize;
    if blob_len > cursor.get_ref().len() {
        return Err(PagerError::Corrupt(
            "bloom blob length exceeds the page".to_string(),
        ));
    }
    let mut blob = vec![0u8; blob_len];
    cursor.read_exact(&mut blob)?;
    Ok(Some(BloomFilter::from_bytes(&blob)?))
}

fn read_record(cursor: &mut Cursor<&[u8]>) -> Result<Record> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    if len > MAX_RECORD_BYTES {
        return Err(PagerError::Corrupt(format!(
            "record blob of {len} bytes exceeds maximum"
        )));
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(Record::from_bytes(&bytes)?)
}
