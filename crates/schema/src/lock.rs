//! Process-wide registry of per-path locks.
//!
//! Every environment targeting the same storage directory shares one
//! re-entrant lock, serializing catalog bootstrap, database declaration and
//! close/reopen. Entries are created on first use and live for the process.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use parking_lot::{Mutex, ReentrantMutex};

/// Lock shared by every environment at one path.
pub type PathLock = Arc<ReentrantMutex<()>>;

/// Registry mapping canonical storage paths to their locks.
#[derive(Debug, Default)]
pub struct PathLockRegistry {
    locks: Mutex<HashMap<PathBuf, PathLock>>,
}

static GLOBAL: OnceLock<PathLockRegistry> = OnceLock::new();

impl PathLockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Returns the lock for `path`, creating it on first use.
    ///
    /// `path` should already be canonical so that different spellings of the
    /// same directory share a lock.
    pub fn lock_for(&self, path: &Path) -> PathLock {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no path has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;

    #[test]
    fn test_same_path_shares_lock() {
        let registry = PathLockRegistry::new();
        let a = registry.lock_for(Path::new("/data/a"));
        let again = registry.lock_for(Path::new("/data/a"));
        let b = registry.lock_for(Path::new("/data/b"));

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lock_is_reentrant() {
        let registry = PathLockRegistry::new();
        let lock = registry.lock_for(Path::new("/data/r"));
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn test_lock_excludes_other_threads() {
        let registry = Arc::new(PathLockRegistry::new());
        let lock = registry.lock_for(Path::new("/data/x"));
        let guard = lock.lock();
        let barrier = Arc::new(Barrier::new(2));

        let handle = {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let lock = registry.lock_for(Path::new("/data/x"));
                barrier.wait();
                lock.try_lock().is_none()
            })
        };

        barrier.wait();
        let blocked = handle.join().unwrap();
        drop(guard);
        assert!(blocked, "other thread acquired a held lock");

        assert!(lock.try_lock().is_some());
    }
}
