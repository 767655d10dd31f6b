//! File-based storage backend.
//!
//! Snapshots are written to a sibling temporary file, fsynced, then renamed
//! over the previous snapshot. The rename is the commit point: a crash before
//! it leaves the old snapshot intact.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::StorageBackend;
use crate::error::Result;

/// File-based storage backend.
pub struct FileBackend {
    /// Location of the committed snapshot.
    path: PathBuf,
    /// Serializes snapshot replacement.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Creates a backend for the snapshot at `path`.
    ///
    /// The file does not need to exist; the parent directory is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the parent directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for FileBackend {
    fn read_snapshot(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_snapshot(&self, data: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        let temp_path = self.temp_path();

        let mut file =
            OpenOptions::new().write(true).create(true).truncate(true).open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // Persist the rename by syncing the containing directory where supported.
        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}
