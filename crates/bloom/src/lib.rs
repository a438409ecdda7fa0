//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate depends on the
//! number of bits and hash functions used.
//!
//! ## Usage in driftkv
//!
//! Each SSTable **leaf page** embeds a bloom filter built from exactly the
//! keys stored in that page. Point lookups descending into a leaf check the
//! filter first; a negative answer skips the in-page binary search entirely.
//!
//! ## Sizing
//!
//! The filter is constructed from `m` bits and an expected population of `n`
//! keys; the number of hash functions is derived as `k = round((m/n)·ln 2)`,
//! clamped to at least 1.
//!
//! ## Hashing
//!
//! Keys are hashed over their canonical serialized bytes (the key field
//! only, never the value). A base hash `h1` (FNV-1a) and a derived seed
//! `h2 = hash(h1)` (forced non-zero) produce `k` probes by double hashing:
//! `p_i = (h1 + i·h2) mod m`.

use record::{FieldValue, Record};
use std::io;
use thiserror::Error;

/// Fallback seed when `h2` hashes to zero; a zero stride would degrade all
/// probes to `h1`.
const NON_ZERO_SEED: u64 = 0x27d4_eb2d;

/// Serialized header: `m (u64) + k (u32) + n (u64) + bits_len (u32)`.
const HEADER_BYTES: usize = 8 + 4 + 8 + 4;

/// Safety cap on the deserialized bit array (128 MiB).
const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;

/// Errors that can occur constructing or parsing bloom filters.
#[derive(Debug, Error)]
pub enum BloomError {
    /// A constructor precondition failed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The buffer does not describe a valid bloom filter.
    #[error("corrupt bloom filter data")]
    Corrupt,
}

/// A bloom filter backed by a bit vector with `k` double-hashed probes.
#[derive(Clone)]
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of bits in the filter (`m`).
    num_bits: u64,
    /// Number of hash functions (`k`).
    num_hashes: u32,
    /// Expected population the filter was sized for (`n`).
    expected_keys: u64,
}

impl BloomFilter {
    /// Creates a filter with `m` bits sized for `n` expected keys.
    ///
    /// # Errors
    ///
    /// Returns [`BloomError::InvalidArgument`] if `m` or `n` is zero.
    pub fn new(m: u64, n: u64) -> Result<Self, BloomError> {
        if m == 0 {
            return Err(BloomError::InvalidArgument("number of bits must be > 0"));
        }
        if n == 0 {
            return Err(BloomError::InvalidArgument(
                "expected number of keys must be > 0",
            ));
        }

        // Optimal number of hashes: k = (m/n) * ln 2, at least one.
        let k = ((m as f64 / n as f64) * std::f64::consts::LN_2).round() as u32;
        let k = k.max(1);

        let byte_len = ((m + 7) / 8) as usize;

        Ok(Self {
            bits: vec![0u8; byte_len],
            num_bits: m,
            num_hashes: k,
            expected_keys: n,
        })
    }

    fn from_raw(bits: Vec<u8>, num_bits: u64, num_hashes: u32, expected_keys: u64) -> Self {
        Self {
            bits,
            num_bits,
            num_hashes,
            expected_keys,
        }
    }

    /// Adds a record's key to the filter.
    pub fn add(&mut self, record: &Record) {
        self.add_key(&record.key);
    }

    /// Adds a bare key to the filter.
    pub fn add_key(&mut self, key: &FieldValue) {
        let (h1, h2) = hash_pair(&key.to_bytes());
        for i in 0..self.num_hashes {
            let bit = probe(h1, h2, i, self.num_bits);
            self.set_bit(bit);
        }
    }

    /// Returns `true` if the record's key **might** be present, `false` if it
    /// is **definitely not**.
    #[must_use]
    pub fn possibly_contains(&self, record: &Record) -> bool {
        self.possibly_contains_key(&record.key)
    }

    /// Key-level variant of [`possibly_contains`](Self::possibly_contains).
    #[must_use]
    pub fn possibly_contains_key(&self, key: &FieldValue) -> bool {
        let (h1, h2) = hash_pair(&key.to_bytes());
        for i in 0..self.num_hashes {
            let bit = probe(h1, h2, i, self.num_bits);
            if !self.get_bit(bit) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    #[must_use]
    pub fn expected_keys(&self) -> u64 {
        self.expected_keys
    }

    /// Exact size of [`to_bytes`](Self::to_bytes) output.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        HEADER_BYTES + self.bits.len()
    }

    /// Serializes the filter.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [m: u64][k: u32][n: u64][bits_len: u32][bits]
    /// ```
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        buf.extend_from_slice(&self.num_bits.to_le_bytes());
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&self.expected_keys.to_le_bytes());
        buf.extend_from_slice(&(self.bits.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Deserializes a filter previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`BloomError::Corrupt`] if the buffer is shorter than the
    /// fixed header, truncated, or carries an implausible bit-array length.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, BloomError> {
        if buf.len() < HEADER_BYTES {
            return Err(BloomError::Corrupt);
        }

        let mut cursor = io::Cursor::new(buf);
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        io::Read::read_exact(&mut cursor, &mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);
        io::Read::read_exact(&mut cursor, &mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);
        io::Read::read_exact(&mut cursor, &mut buf8)?;
        let expected_keys = u64::from_le_bytes(buf8);
        io::Read::read_exact(&mut cursor, &mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;

        if bits_len > MAX_BLOOM_BYTES || buf.len() < HEADER_BYTES + bits_len {
            return Err(BloomError::Corrupt);
        }
        if num_bits == 0 {
            return Err(BloomError::Corrupt);
        }

        let bits = buf[HEADER_BYTES..HEADER_BYTES + bits_len].to_vec();
        Ok(Self::from_raw(bits, num_bits, num_hashes, expected_keys))
    }

    // ---- Internal helpers ----

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("expected_keys", &self.expected_keys)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Base hash plus derived stride for double hashing.
fn hash_pair(data: &[u8]) -> (u64, u64) {
    let h1 = fnv1a_64(data);
    let mut h2 = fnv1a_64(&h1.to_le_bytes());
    if h2 == 0 {
        h2 = NON_ZERO_SEED;
    }
    (h1, h2)
}

/// Double hashing: p_i = (h1 + i * h2) mod m.
fn probe(h1: u64, h2: u64, i: u32, num_bits: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % num_bits
}

/// FNV-1a 64-bit hash.
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
