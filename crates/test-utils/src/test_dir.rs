//! Temporary directory management for tests.
//!
//! [`TestDir`] wraps [`tempfile::TempDir`] with a cleaner API for common test patterns.

// Test utilities are expected to panic on failure - that's their purpose
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use quill_schema::{Environment, EnvironmentConfig};
use tempfile::TempDir;

/// A managed temporary directory for tests.
///
/// The directory is automatically cleaned up when this struct is dropped.
///
/// # Example
///
/// ```
/// use quill_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let env = dir.open_environment();
/// assert!(env.is_open());
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Create a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner = TempDir::new().expect("failed to create temp directory");
        Self { inner }
    }

    /// Returns the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Join a relative path to the temporary directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }

    /// Creates and opens an environment rooted at this directory.
    ///
    /// Tests run on a single scheduler thread without fsync on commit.
    ///
    /// # Panics
    ///
    /// Panics if the environment cannot be created or opened.
    #[must_use]
    pub fn open_environment(&self) -> Environment {
        let env = Environment::with_config(self.path(), test_environment_config())
            .expect("failed to create environment");
        env.open().expect("failed to open environment");
        env
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment settings for tests: one scheduler thread, no sync on commit.
#[must_use]
pub fn test_environment_config() -> EnvironmentConfig {
    EnvironmentConfig::builder()
        .scheduler_threads(1)
        .sync_on_commit(false)
        .build()
        .expect("test configuration is valid")
}
