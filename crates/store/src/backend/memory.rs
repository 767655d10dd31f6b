//! In-memory storage backend for testing.

use parking_lot::RwLock;

use super::StorageBackend;
use crate::error::Result;

/// In-memory storage backend for testing.
///
/// The snapshot is kept in memory and lost when the backend is dropped.
#[derive(Default)]
pub struct InMemoryBackend {
    snapshot: RwLock<Option<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the size of the stored snapshot in bytes.
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.read().as_ref().map_or(0, Vec::len)
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_snapshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot.read().clone())
    }

    fn write_snapshot(&self, data: &[u8]) -> Result<()> {
        *self.snapshot.write() = Some(data.to_vec());
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // No-op for in-memory backend
        Ok(())
    }
}
