//! On-disk layout of a masking cache entry.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("VXDC")
//! 4       1     Format version
//! 5       1     Compression (0 = none, 1 = zstd)
//! 6       32    SHA-256 digest of the cache key
//! 38      4     Rows (samples)
//! 42      4     Columns (voxels)
//! 46      4     Stored payload size
//! 50      4     CRC32 of the stored payload
//! 54      ...   Payload: postcard `Vec<f32>`, row-major, maybe zstd-framed
//! ```
//!
//! The key digest in the header ties an entry to the inputs it was computed
//! from, so a file that ends up under the wrong name is rejected before its
//! payload is read.

use std::io::{Read, Write};

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use super::CacheKey;

// ============================================================================
// Constants
// ============================================================================

/// Magic bytes identifying a cache entry.
pub const MAGIC: &[u8; 4] = b"VXDC";

/// Bumped whenever the layout or payload encoding changes.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the entry header in bytes.
pub const HEADER_SIZE: usize = 54;

/// Payloads at least this large are zstd-compressed (32KB).
pub const COMPRESSION_THRESHOLD: usize = 32 * 1024;

/// Upper bound on postcard's length prefix for a `Vec<f32>`.
const MAX_VARINT_LEN: usize = 10;

// ============================================================================
// Header
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Zstd = 1,
}

impl Compression {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Fixed-size entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub compression: Compression,
    pub key: [u8; 32],
    pub n_rows: u32,
    pub n_cols: u32,
    pub payload_size: u32,
    pub checksum: u32,
}

impl EntryHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = FORMAT_VERSION;
        buf[5] = self.compression as u8;
        buf[6..38].copy_from_slice(&self.key);
        buf[38..42].copy_from_slice(&self.n_rows.to_le_bytes());
        buf[42..46].copy_from_slice(&self.n_cols.to_le_bytes());
        buf[46..50].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[50..54].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, DecodeError> {
        if &buf[0..4] != MAGIC {
            return Err(DecodeError::NotAnEntry);
        }
        if buf[4] != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(buf[4]));
        }
        let compression =
            Compression::from_u8(buf[5]).ok_or(DecodeError::CorruptHeader("unknown compression"))?;

        let le_u32 = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut key = [0u8; 32];
        key.copy_from_slice(&buf[6..38]);

        Ok(Self {
            compression,
            key,
            n_rows: le_u32(38),
            n_cols: le_u32(42),
            payload_size: le_u32(46),
            checksum: le_u32(50),
        })
    }

    /// Largest decoded payload a matrix of this shape can need.
    fn max_decoded_len(&self) -> Option<usize> {
        (self.n_rows as usize)
            .checked_mul(self.n_cols as usize)?
            .checked_mul(std::mem::size_of::<f32>())?
            .checked_add(MAX_VARINT_LEN)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("matrix too large for cache entry: {0} elements")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a cache entry")]
    NotAnEntry,

    #[error("unsupported entry format version {0}")]
    UnsupportedVersion(u8),

    #[error("corrupt header: {0}")]
    CorruptHeader(&'static str),

    #[error("entry was stored for key {found}")]
    KeyMismatch { found: String },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("entry truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding error: {0}")]
    Decoding(#[from] postcard::Error),
}

// ============================================================================
// Codec
// ============================================================================

/// Reads and writes cache entries.
#[derive(Debug, Clone)]
pub struct EntryCodec {
    /// Whether to compress payloads above [`COMPRESSION_THRESHOLD`].
    pub compress: bool,
    /// zstd level (1-22).
    pub compression_level: i32,
}

impl Default for EntryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryCodec {
    pub fn new() -> Self {
        Self {
            compress: true,
            compression_level: 3,
        }
    }

    pub fn without_compression() -> Self {
        Self {
            compress: false,
            compression_level: 0,
        }
    }

    /// Encode `matrix` as a complete entry stored under `key`.
    pub fn encode_matrix(&self, key: &CacheKey, matrix: ArrayView2<'_, f32>) -> Result<Vec<u8>, EncodeError> {
        let (rows, cols) = matrix.dim();
        let to_u32 = |n: usize| u32::try_from(n).map_err(|_| EncodeError::TooLarge(matrix.len()));
        let values: Vec<f32> = matrix.iter().copied().collect();
        let raw = postcard::to_allocvec(&values)?;

        let (compression, stored) = if self.compress && raw.len() >= COMPRESSION_THRESHOLD {
            (Compression::Zstd, zstd::encode_all(raw.as_slice(), self.compression_level)?)
        } else {
            (Compression::None, raw)
        };

        let header = EntryHeader {
            compression,
            key: *key.digest(),
            n_rows: to_u32(rows)?,
            n_cols: to_u32(cols)?,
            payload_size: to_u32(stored.len())?,
            checksum: crc32fast::hash(&stored),
        };

        let mut output = Vec::with_capacity(HEADER_SIZE + stored.len());
        output.write_all(&header.to_bytes())?;
        output.write_all(&stored)?;
        Ok(output)
    }

    /// Decode an entry, rejecting it unless it was stored under `key`.
    ///
    /// Reads never allocate more than the reader actually yields, so a header
    /// claiming an absurd payload size fails as truncated.
    pub fn decode_matrix<R: Read>(&self, reader: &mut R, key: &CacheKey) -> Result<Array2<f32>, DecodeError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DecodeError::NotAnEntry
            } else {
                DecodeError::Io(e)
            }
        })?;
        let header = EntryHeader::from_bytes(&header_buf)?;
        if &header.key != key.digest() {
            return Err(DecodeError::KeyMismatch {
                found: hex::encode(header.key),
            });
        }
        let max_decoded = header
            .max_decoded_len()
            .ok_or(DecodeError::CorruptHeader("shape overflows"))?;

        let expected = header.payload_size as usize;
        let mut stored = Vec::new();
        reader.by_ref().take(expected as u64).read_to_end(&mut stored)?;
        if stored.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                found: stored.len(),
            });
        }

        let actual = crc32fast::hash(&stored);
        if actual != header.checksum {
            return Err(DecodeError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let raw = match header.compression {
            Compression::None => stored,
            Compression::Zstd => {
                let mut raw = Vec::new();
                zstd::stream::read::Decoder::new(stored.as_slice())?
                    .take(max_decoded as u64 + 1)
                    .read_to_end(&mut raw)?;
                if raw.len() > max_decoded {
                    return Err(DecodeError::CorruptPayload(
                        "decompressed payload exceeds header shape".into(),
                    ));
                }
                raw
            }
        };

        let values: Vec<f32> = postcard::from_bytes(&raw)?;
        Array2::from_shape_vec((header.n_rows as usize, header.n_cols as usize), values)
            .map_err(|e| DecodeError::CorruptPayload(e.to_string()))
    }
}
