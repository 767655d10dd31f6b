//! Environment and catalog configuration.
//!
//! Both types validate on construction through their builders and can be
//! loaded from any serde format:
//!
//! ```no_run
//! # use quill_schema::{CatalogConfig, EnvironmentConfig};
//! let config = EnvironmentConfig::builder()
//!     .scheduler_threads(4)
//!     .catalog(CatalogConfig::builder().memory_limit(8 << 20).build()?)
//!     .build()?;
//! # Ok::<(), quill_schema::Error>(())
//! ```

use quill_store::EngineConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    error::{EngineSnafu, Error, Result},
    schema::Compression,
};

/// Default catalog memory limit: 16 MiB.
const DEFAULT_CATALOG_MEMORY_LIMIT: u64 = 16 * 1024 * 1024;

/// Settings of the engine that stores the catalog.
///
/// The catalog is small and written rarely, so it runs single-threaded with
/// a modest memory budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogConfig {
    /// Scheduler threads of the catalog engine. Must be >= 1.
    #[serde(default = "default_catalog_threads")]
    pub scheduler_threads: u32,
    /// Memory budget of the catalog engine in bytes. Must be > 0.
    #[serde(default = "default_catalog_memory_limit")]
    pub memory_limit: u64,
    /// Compression codec declared for the catalog database.
    #[serde(default)]
    pub compression: Compression,
}

#[bon::bon]
impl CatalogConfig {
    /// Creates a new catalog configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_catalog_threads())] scheduler_threads: u32,
        #[builder(default = default_catalog_memory_limit())] memory_limit: u64,
        #[builder(default)] compression: Compression,
    ) -> Result<Self> {
        let config = Self { scheduler_threads, memory_limit, compression };
        config.validate()?;
        Ok(config)
    }
}

impl CatalogConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler_threads == 0 {
            return Err(Error::Config { message: "catalog scheduler_threads must be >= 1".to_string() });
        }
        if self.memory_limit == 0 {
            return Err(Error::Config { message: "catalog memory_limit must be > 0".to_string() });
        }
        Ok(())
    }

    pub(crate) fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::builder()
            .scheduler_threads(self.scheduler_threads)
            .memory_limit(self.memory_limit)
            .build()
            .context(EngineSnafu)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: default_catalog_threads(),
            memory_limit: default_catalog_memory_limit(),
            compression: Compression::default(),
        }
    }
}

fn default_catalog_threads() -> u32 {
    1
}

fn default_catalog_memory_limit() -> u64 {
    DEFAULT_CATALOG_MEMORY_LIMIT
}

/// Settings of an [`Environment`](crate::Environment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentConfig {
    /// Scheduler threads of the data engine. Must be >= 1.
    #[serde(default = "default_scheduler_threads")]
    pub scheduler_threads: u32,
    /// Memory budget of the data engine in bytes; 0 disables the limit.
    #[serde(default)]
    pub memory_limit: u64,
    /// Whether each commit is synced to disk before returning.
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
    /// Catalog engine settings.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[bon::bon]
impl EnvironmentConfig {
    /// Creates a new environment configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_scheduler_threads())] scheduler_threads: u32,
        #[builder(default)] memory_limit: u64,
        #[builder(default = default_sync_on_commit())] sync_on_commit: bool,
        #[builder(default)] catalog: CatalogConfig,
    ) -> Result<Self> {
        let config = Self { scheduler_threads, memory_limit, sync_on_commit, catalog };
        config.validate()?;
        Ok(config)
    }
}

impl EnvironmentConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler_threads == 0 {
            return Err(Error::Config { message: "scheduler_threads must be >= 1".to_string() });
        }
        self.catalog.validate()
    }

    pub(crate) fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::builder()
            .scheduler_threads(self.scheduler_threads)
            .memory_limit(self.memory_limit)
            .sync_on_commit(self.sync_on_commit)
            .build()
            .context(EngineSnafu)
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: default_scheduler_threads(),
            memory_limit: 0,
            sync_on_commit: default_sync_on_commit(),
            catalog: CatalogConfig::default(),
        }
    }
}

fn default_scheduler_threads() -> u32 {
    2
}

fn default_sync_on_commit() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EnvironmentConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config, EnvironmentConfig::default());
        assert_eq!(config.catalog.scheduler_threads, 1);
        assert_eq!(config.catalog.compression, Compression::Zstd);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EnvironmentConfig::builder().scheduler_threads(0).build().is_err());
        assert!(CatalogConfig::builder().memory_limit(0).build().is_err());
        assert!(CatalogConfig::builder().scheduler_threads(0).build().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: EnvironmentConfig =
            serde_json::from_str(r#"{"scheduler_threads": 3, "catalog": {"compression": "lz4"}}"#)
                .unwrap();
        assert_eq!(config.scheduler_threads, 3);
        assert!(config.sync_on_commit);
        assert_eq!(config.catalog.compression, Compression::Lz4);
        assert_eq!(config.catalog.memory_limit, DEFAULT_CATALOG_MEMORY_LIMIT);
        config.validate().unwrap();
    }

    #[test]
    fn test_engine_config_conversion() {
        let config = EnvironmentConfig::builder().scheduler_threads(6).memory_limit(1 << 20).build().unwrap();
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.scheduler_threads, 6);
        assert_eq!(engine.memory_limit, 1 << 20);
        assert_eq!(config.catalog.engine_config().unwrap().scheduler_threads, 1);
    }
}
