//! Storage backend abstraction for the engine.
//!
//! Each database keeps its committed records as one sealed snapshot. The
//! backend trait abstracts where that snapshot lives, allowing both
//! file-based (production) and in-memory (testing) implementations.
//!
//! # Snapshot Layout
//!
//! ```text
//! ┌──────────┬─────────┬─────────────┬──────────────┬───────────────┐
//! │ magic 8B │ ver 2B  │ payload 8B  │ checksum 8B  │ payload ...   │
//! └──────────┴─────────┴─────────────┴──────────────┴───────────────┘
//! ```
//!
//! All integers are little-endian. The checksum is XXH3-64 over the payload.
//! A snapshot is replaced as a whole, so a reader sees either the previous or
//! the next committed state, never a mix.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

use crate::error::{Error, Result};

/// Snapshot header size: magic + version + payload length + checksum.
pub const HEADER_SIZE: usize = 26;

/// Magic number for quill snapshot files.
pub const MAGIC: &[u8; 8] = b"QUILLSNP";

/// Current snapshot format version.
pub const FORMAT_VERSION: u16 = 1;

/// Storage backend trait for abstracting snapshot persistence.
pub trait StorageBackend: Send + Sync {
    /// Reads the last written snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails.
    fn read_snapshot(&self) -> Result<Option<Vec<u8>>>;

    /// Atomically replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    fn write_snapshot(&self, data: &[u8]) -> Result<()>;

    /// Flushes all writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the sync fails.
    fn sync(&self) -> Result<()>;
}

/// Wraps a payload with the snapshot header.
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&xxhash_rust::xxh3::xxh3_64(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Verifies the snapshot header and returns the payload.
///
/// # Errors
///
/// Returns [`Error::InvalidMagic`], [`Error::UnsupportedVersion`],
/// [`Error::Corrupted`] for a truncated file, or [`Error::ChecksumMismatch`].
pub fn unseal<'a>(database: &str, data: &'a [u8]) -> Result<&'a [u8]> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Corrupted {
            reason: format!("snapshot of '{database}' is {} bytes, shorter than its header", data.len()),
        });
    }
    if &data[0..8] != MAGIC {
        return Err(Error::InvalidMagic);
    }

    let version = u16::from_le_bytes([data[8], data[9]]);
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion { version });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[10..18]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;

    let mut checksum_bytes = [0u8; 8];
    checksum_bytes.copy_from_slice(&data[18..26]);
    let checksum = u64::from_le_bytes(checksum_bytes);

    let payload = &data[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(Error::Corrupted {
            reason: format!(
                "snapshot of '{database}' declares {payload_len} payload bytes, found {}",
                payload.len()
            ),
        });
    }
    if xxhash_rust::xxh3::xxh3_64(payload) != checksum {
        return Err(Error::ChecksumMismatch { database: database.to_string() });
    }

    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_unseal() {
        let sealed = seal(b"payload");
        assert_eq!(sealed.len(), HEADER_SIZE + 7);
        assert_eq!(unseal("db", &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_unseal_detects_bit_flip() {
        let mut sealed = seal(b"payload");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(unseal("db", &sealed), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_unseal_rejects_foreign_files() {
        let mut sealed = seal(b"payload");
        sealed[0] = b'X';
        assert!(matches!(unseal("db", &sealed), Err(Error::InvalidMagic)));

        assert!(matches!(unseal("db", b"short"), Err(Error::Corrupted { .. })));

        let mut sealed = seal(b"payload");
        sealed[8] = 9;
        assert!(matches!(unseal("db", &sealed), Err(Error::UnsupportedVersion { version: 9 })));
    }
}
