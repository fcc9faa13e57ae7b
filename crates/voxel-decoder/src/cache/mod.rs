//! Content-addressed memoization of masking results.
//!
//! Masking a full functional run (smoothing every frame, then standardizing)
//! is the most expensive stage, so its output is stored on disk under a key
//! derived from the inputs:
//!
//! - identity of every input file (absolute path, length, modification time)
//! - the masking parameters
//! - the session assignment used for standardization
//!
//! Entries live at `<root>/masking/<sha256>.vxc` in the [`codec`] format,
//! which repeats the key digest in its header. A missing, unreadable, corrupt
//! or mismatched entry is a miss; the caller recomputes and stores a fresh
//! entry.

pub mod codec;

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ndarray::{Array2, ArrayView2};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub use codec::{DecodeError, EncodeError, EntryCodec};

/// Errors raised by the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] EncodeError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// SHA-256 digest identifying an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn digest(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incrementally builds a [`CacheKey`].
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    hasher: Sha256,
}

impl KeyBuilder {
    pub fn new(namespace: &str) -> Self {
        let mut builder = Self::default();
        builder.field("namespace", namespace.as_bytes());
        builder
    }

    /// Length-prefixed field so adjacent fields cannot alias.
    pub fn field(&mut self, name: &str, bytes: &[u8]) -> &mut Self {
        for part in [name.as_bytes(), bytes] {
            self.hasher.update((part.len() as u64).to_le_bytes());
            self.hasher.update(part);
        }
        self
    }

    /// Hash a file's identity without reading its contents.
    pub fn file(&mut self, path: &Path) -> Result<&mut Self, CacheError> {
        let absolute = fs::canonicalize(path).map_err(io_error(path))?;
        let meta = fs::metadata(&absolute).map_err(io_error(path))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        self.field("path", absolute.to_string_lossy().as_bytes());
        self.field("len", &meta.len().to_le_bytes());
        self.field("mtime", &modified.to_le_bytes());
        Ok(self)
    }

    pub fn finish(&self) -> CacheKey {
        CacheKey(self.hasher.clone().finalize().into())
    }
}

/// On-disk store of masked feature matrices.
#[derive(Debug, Clone)]
pub struct MaskingCache {
    root: PathBuf,
    codec: EntryCodec,
}

impl MaskingCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            codec: EntryCodec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join("masking").join(format!("{}.vxc", key.to_hex()))
    }

    /// Look up an entry. Unreadable or corrupt entries count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<Array2<f32>> {
        let path = self.entry_path(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(_) => {
                debug!(key = %key, "masking cache miss");
                return None;
            }
        };

        match self.codec.decode_matrix(&mut BufReader::new(file), key) {
            Ok(matrix) => {
                debug!(key = %key, shape = ?matrix.dim(), "masking cache hit");
                Some(matrix)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store an entry. Written to a temporary file first, then renamed.
    pub fn put(&self, key: &CacheKey, matrix: ArrayView2<'_, f32>) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let bytes = self.codec.encode_matrix(key, matrix)?;
        let tmp = path.with_extension("vxc.tmp");
        fs::write(&tmp, &bytes).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        debug!(key = %key, bytes = bytes.len(), "stored masking cache entry");
        Ok(path)
    }
}
