//! Engine configuration: construction-time settings and the live key/value view.
//!
//! The engine is configured through a flat namespace of string keys:
//!
//! | key | meaning |
//! |-----|---------|
//! | `engine.version`, `engine.status`, `engine.path` | read-only engine state |
//! | `scheduler.threads` | worker thread count |
//! | `memory.limit` | memory budget in bytes (0 = unlimited) |
//! | `db` | defines a database named by the value |
//! | `db.<name>.scheme` | adds a field named by the value |
//! | `db.<name>.scheme.<field>` | field type, e.g. `u32_rev,key(0)` |
//! | `db.<name>.id` | read-only, assigned when the database is defined |
//! | `db.<name>.<param>` | database parameter (`compression`, `cache_size`, ...) |

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key for the number of scheduler threads.
pub const SCHEDULER_THREADS: &str = "scheduler.threads";

/// Key for the memory budget.
pub const MEMORY_LIMIT: &str = "memory.limit";

/// Compression codecs a database may declare.
pub const COMPRESSION_CODECS: [&str; 3] = ["none", "lz4", "zstd"];

/// Construction-time engine settings.
///
/// # Example
///
/// ```no_run
/// # use quill_store::EngineConfig;
/// let config = EngineConfig::builder()
///     .scheduler_threads(1)
///     .memory_limit(64 * 1024 * 1024)
///     .build()
///     .expect("valid engine config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Number of scheduler threads. Must be >= 1.
    #[serde(default = "default_scheduler_threads")]
    pub scheduler_threads: u32,
    /// Memory budget in bytes; 0 disables the limit.
    #[serde(default)]
    pub memory_limit: u64,
    /// Whether to sync snapshots to disk on every commit (default true for durability).
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
}

#[bon::bon]
impl EngineConfig {
    /// Creates a new engine configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `scheduler_threads` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_scheduler_threads())] scheduler_threads: u32,
        #[builder(default)] memory_limit: u64,
        #[builder(default = default_sync_on_commit())] sync_on_commit: bool,
    ) -> Result<Self> {
        let config = Self { scheduler_threads, memory_limit, sync_on_commit };
        config.validate()?;
        Ok(config)
    }
}

impl EngineConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler_threads == 0 {
            return Err(Error::InvalidConfig {
                key: SCHEDULER_THREADS.to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: default_scheduler_threads(),
            memory_limit: 0,
            sync_on_commit: default_sync_on_commit(),
        }
    }
}

fn default_scheduler_threads() -> u32 {
    2
}

fn default_sync_on_commit() -> bool {
    true
}

/// Validates a database parameter value before it is stored.
pub(crate) fn validate_db_param(key: &str, param: &str, value: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidConfig { key: key.to_string(), reason };
    match param {
        "compression" if !COMPRESSION_CODECS.contains(&value) => {
            Err(invalid(format!("unknown codec '{value}', expected one of {COMPRESSION_CODECS:?}")))
        },
        "cache_size" if value.parse::<u64>().is_err() => {
            Err(invalid(format!("'{value}' is not a non-negative integer")))
        },
        "" => Err(invalid("empty parameter name".to_string())),
        _ => Ok(()),
    }
}

/// Read-only snapshot of every live configuration pair.
///
/// Values are rendered as strings, integers in decimal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    pub(crate) fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Returns the value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true if `key` is live.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over all pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over the pairs whose key starts with `prefix`, in key order.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of live pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
