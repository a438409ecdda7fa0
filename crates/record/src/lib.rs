//! # Record — typed key/value records
//!
//! The unit of storage for the driftkv engine. A [`Record`] pairs a typed
//! key with a typed value and carries the bookkeeping the LSM layers need:
//! a monotonically assigned **sequence number** and a **tombstone** flag.
//!
//! ## Type system
//!
//! Keys and values are [`FieldValue`]s: a tagged union over five concrete
//! types plus an explicit "unset" state used by the empty-record sentinel:
//!
//! | Tag | Variant  | Payload            |
//! |-----|----------|--------------------|
//! | 0   | `None`   | —                  |
//! | 1   | `Int`    | `i32`              |
//! | 2   | `Long`   | `i64`              |
//! | 3   | `Double` | `f64`              |
//! | 4   | `Char`   | fixed-length bytes |
//! | 5   | `Str`    | variable string    |
//!
//! Ordering is total across all variants: first by tag, then by the typed
//! payload (`f64::total_cmp` for doubles, so NaN does not break sort
//! invariants). One store normally sticks to a single key type, but mixed
//! keys still sort deterministically.
//!
//! ## Ordering and equality
//!
//! Records compare **by key only**. Sequence number and tombstone never
//! participate; they discriminate *versions* of the same key, which the
//! merge layers resolve separately. This is load-bearing: leaf pages are
//! sorted by `Record` order, and duplicate detection during merges is
//! `Record` equality.
//!
//! ## Wire format
//!
//! A field serializes as `[tag: u8][payload]` (integers little-endian,
//! strings length-prefixed with `u32`); a record is its key field followed
//! by its value field. `seq` and `tombstone` are *not* part of the record
//! bytes; the leaf-page entry framing carries them. `serialized_size()`
//! reports the exact byte count without serializing, so page packers can
//! maintain a running budget.

use byteorder::{LittleEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::io::{self, Read};
use thiserror::Error;

/// Maximum length accepted for a string payload (64 KiB). Prevents OOM when
/// parsing corrupt buffers.
const MAX_STRING_BYTES: usize = 64 * 1024;

const TAG_NONE: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_LONG: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_CHAR: u8 = 4;
const TAG_STR: u8 = 5;

/// Errors that can occur while serializing or parsing records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The buffer does not describe a valid field or record.
    #[error("corrupt record data: {0}")]
    Corrupt(&'static str),
}

/// A typed key or value.
///
/// `FieldValue::None` is the unset state; it only appears in the
/// empty-record sentinel and never inside a page.
#[derive(Debug, Clone, Default)]
pub enum FieldValue {
    #[default]
    None,
    Int(i32),
    Long(i64),
    Double(f64),
    /// Fixed-length character payload.
    Char(String),
    /// Variable-length string payload.
    Str(String),
}

impl FieldValue {
    /// Wire tag of this variant. Doubles as the cross-type ordering rank.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::None => TAG_NONE,
            FieldValue::Int(_) => TAG_INT,
            FieldValue::Long(_) => TAG_LONG,
            FieldValue::Double(_) => TAG_DOUBLE,
            FieldValue::Char(_) => TAG_CHAR,
            FieldValue::Str(_) => TAG_STR,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }

    /// Exact serialized size in bytes (tag included), without serializing.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        1 + match self {
            FieldValue::None => 0,
            FieldValue::Int(_) => 4,
            FieldValue::Long(_) | FieldValue::Double(_) => 8,
            FieldValue::Char(s) | FieldValue::Str(s) => 4 + s.len(),
        }
    }

    /// Canonical byte rendering: `[tag][payload]`, integers little-endian.
    ///
    /// This is both the on-page encoding and the input to bloom-filter
    /// hashing, so it must stay stable.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        buf.push(self.tag());
        match self {
            FieldValue::None => {}
            FieldValue::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Long(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Char(s) | FieldValue::Str(s) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
        buf
    }

    /// Parses one field from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, RecordError> {
        let tag = r.read_u8()?;
        Ok(match tag {
            TAG_NONE => FieldValue::None,
            TAG_INT => FieldValue::Int(r.read_i32::<LittleEndian>()?),
            TAG_LONG => FieldValue::Long(r.read_i64::<LittleEndian>()?),
            TAG_DOUBLE => FieldValue::Double(r.read_f64::<LittleEndian>()?),
            TAG_CHAR | TAG_STR => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                if len > MAX_STRING_BYTES {
                    return Err(RecordError::Corrupt("string payload exceeds maximum"));
                }
                let mut bytes = vec![0u8; len];
                r.read_exact(&mut bytes)?;
                let s = String::from_utf8(bytes)
                    .map_err(|_| RecordError::Corrupt("string payload is not utf-8"))?;
                if tag == TAG_CHAR {
                    FieldValue::Char(s)
                } else {
                    FieldValue::Str(s)
                }
            }
            _ => return Err(RecordError::Corrupt("unknown field tag")),
        })
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Long(a), Long(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Char(a), Char(b)) | (Str(a), Str(b)) => a.cmp(b),
            // Different variants (and None vs None) order by tag rank.
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// A key/value pair plus the versioning metadata the LSM layers need.
///
/// `Record::default()` is the *empty sentinel*: no key, no value, seq 0.
/// It never appears on disk; lookups that miss return it (or `None` at the
/// public API surface).
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub key: FieldValue,
    pub value: FieldValue,
    /// Monotonic write order; assigned by the coordinator at admission.
    pub seq: u64,
    /// A tombstone masks older versions of the same key until compacted away.
    pub tombstone: bool,
}

impl Record {
    pub fn new(key: impl Into<FieldValue>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            seq: 0,
            tombstone: false,
        }
    }

    /// A probe record carrying only a key; used for lookups and range bounds.
    pub fn key_only(key: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::None,
            seq: 0,
            tombstone: false,
        }
    }

    /// True for the empty default (the absent-result sentinel).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none()
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    pub fn mark_tombstone(&mut self) {
        self.tombstone = true;
    }

    /// Exact serialized size of key + value, without serializing.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        self.key.serialized_size() + self.value.serialized_size()
    }

    /// Serializes key and value. `seq`/`tombstone` are carried by the page
    /// entry framing, not the record bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.key.to_bytes();
        buf.extend_from_slice(&self.value.to_bytes());
        buf
    }

    /// Parses a record (key field, then value field) from a byte slice.
    ///
    /// Fails with [`RecordError::Corrupt`] if the slice has trailing bytes;
    /// the page framing length-prefixes every record, so a size mismatch
    /// means the page is damaged.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, RecordError> {
        let mut cursor = io::Cursor::new(buf);
        let key = FieldValue::read_from(&mut cursor)?;
        let value = FieldValue::read_from(&mut cursor)?;
        if cursor.position() != buf.len() as u64 {
            return Err(RecordError::Corrupt("record has trailing bytes"));
        }
        Ok(Self {
            key,
            value,
            seq: 0,
            tombstone: false,
        })
    }
}

impl PartialEq for Record {
    /// Key-only equality: two records are "the same" if they carry the same
    /// key, regardless of value, sequence number, or tombstone.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
