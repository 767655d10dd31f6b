//! The engine handle: configuration namespace, database registry, lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use quill_store::Engine;
//!
//! let engine = Engine::create("/var/lib/quill")?;
//! engine.set_string("db", "users")?;
//! engine.set_string("db.users.scheme", "name")?;
//! engine.set_string("db.users.scheme.name", "string,key(0)")?;
//! engine.open()?;
//!
//! let users = engine.get_object("db.users")?;
//! let mut record = users.document();
//! record.set_string("name", "ann");
//! users.set(&record)?;
//! # Ok::<(), quill_store::Error>(())
//! ```

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    backend::{FileBackend, InMemoryBackend, StorageBackend},
    config::{Configuration, EngineConfig, MEMORY_LIMIT, SCHEDULER_THREADS, validate_db_param},
    db::{DatabaseHandle, DatabaseInner},
    error::{Error, Result},
    record::StoredRecord,
    transaction::Transaction,
    types::FieldSpec,
};

/// Engine version reported under `engine.version`.
pub const ENGINE_VERSION: &str = "1.0";

/// File extension of database snapshots.
pub const SNAPSHOT_EXTENSION: &str = "qdb";

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created and configurable; records are not accessible yet.
    Offline,
    /// Open for reads and writes.
    Online,
    /// Closed; the handle can no longer be used.
    Shutdown,
}

impl Status {
    /// Name reported under `engine.status`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct EngineState {
    status: Status,
    /// Engine-wide settings (`scheduler.threads`, `memory.limit`).
    settings: BTreeMap<String, String>,
    databases: BTreeMap<String, Arc<DatabaseInner>>,
    next_id: u32,
}

pub(crate) struct EngineInner {
    path: Option<PathBuf>,
    config: EngineConfig,
    state: RwLock<EngineState>,
    /// Serializes commits.
    commit_lock: Mutex<()>,
}

impl EngineInner {
    pub(crate) fn ensure_online(&self) -> Result<()> {
        let status = self.state.read().status;
        if status != Status::Online {
            return Err(Error::Offline { status: status.to_string() });
        }
        Ok(())
    }

    /// Persists every touched database, then makes the writes visible.
    ///
    /// If any snapshot fails to write, the databases already written are
    /// restored to their previous snapshot and no write becomes visible.
    pub(crate) fn commit(
        &self,
        batch: Vec<(Arc<DatabaseInner>, Vec<(Vec<u8>, Option<StoredRecord>)>)>,
    ) -> Result<()> {
        self.ensure_online()?;
        let _guard = self.commit_lock.lock();
        let sync = self.config.sync_on_commit;

        let staged: Vec<_> = batch
            .into_iter()
            .map(|(database, writes)| {
                let count = writes.len();
                let records = database.stage(writes);
                (database, records, count)
            })
            .collect();

        for (position, (database, records, _)) in staged.iter().enumerate() {
            if let Err(e) = database.write_snapshot(records, sync) {
                tracing::warn!(database = database.name(), error = %e, "Commit failed, restoring snapshots");
                for (written, _, _) in &staged[..position] {
                    if let Err(restore) = written.persist(sync) {
                        tracing::error!(
                            database = written.name(),
                            error = %restore,
                            "Failed to restore snapshot"
                        );
                    }
                }
                return Err(e);
            }
        }

        for (database, records, count) in staged {
            database.install(records);
            tracing::trace!(database = database.name(), writes = count, "Committed writes");
        }
        Ok(())
    }

    fn backend_for(&self, name: &str) -> Result<Box<dyn StorageBackend>> {
        Ok(match &self.path {
            Some(path) => {
                Box::new(FileBackend::open(path.join(format!("{name}.{SNAPSHOT_EXTENSION}")))?)
            },
            None => Box::new(InMemoryBackend::new()),
        })
    }
}

/// Handle to a storage engine instance.
///
/// Cheap to clone; all clones share the same state. Configuration can be
/// changed while the engine is offline or online, records are only
/// accessible while online.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine storing its databases under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, EngineConfig::default())
    }

    /// Creates an engine under `path` with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created, or
    /// [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn create_with_config(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(path.as_ref())?;
        Self::build(Some(path.as_ref().to_path_buf()), config)
    }

    /// Creates an engine whose databases live in memory only.
    ///
    /// Useful for testing. Data is lost on drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the default configuration is invalid.
    pub fn in_memory() -> Result<Self> {
        Self::build(None, EngineConfig::default())
    }

    /// Creates an in-memory engine with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn in_memory_with_config(config: EngineConfig) -> Result<Self> {
        Self::build(None, config)
    }

    fn build(path: Option<PathBuf>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let settings = BTreeMap::from([
            (SCHEDULER_THREADS.to_string(), config.scheduler_threads.to_string()),
            (MEMORY_LIMIT.to_string(), config.memory_limit.to_string()),
        ]);
        let state =
            EngineState { status: Status::Offline, settings, databases: BTreeMap::new(), next_id: 0 };
        Ok(Self {
            inner: Arc::new(EngineInner {
                path,
                config,
                state: RwLock::new(state),
                commit_lock: Mutex::new(()),
            }),
        })
    }

    /// Storage directory, `None` for in-memory engines.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.inner.state.read().status
    }

    /// Returns true once [`open`](Self::open) has succeeded and until [`close`](Self::close).
    pub fn is_open(&self) -> bool {
        self.status() == Status::Online
    }

    /// Returns true after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.status() == Status::Shutdown
    }

    /// Loads every defined database and brings the engine online.
    /// Opening an online engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine has been shut down, or a
    /// snapshot error if a database cannot be loaded; the engine then stays
    /// offline.
    pub fn open(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        match state.status {
            Status::Online => Ok(()),
            Status::Offline => {
                let mut records = 0;
                for database in state.databases.values() {
                    database.load()?;
                    records += database.record_count();
                }
                state.status = Status::Online;
                tracing::debug!(databases = state.databases.len(), records, "Engine online");
                Ok(())
            },
            Status::Shutdown => Err(Error::Offline { status: state.status.to_string() }),
        }
    }

    /// Persists every database and shuts the engine down. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a snapshot cannot be written; the engine is shut
    /// down regardless.
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.commit_lock.lock();
        let databases: Vec<_> = {
            let mut state = self.inner.state.write();
            if state.status == Status::Shutdown {
                return Ok(());
            }
            let was_online = state.status == Status::Online;
            state.status = Status::Shutdown;
            if !was_online {
                return Ok(());
            }
            state.databases.values().cloned().collect()
        };

        for database in databases {
            database.persist(true)?;
        }
        tracing::debug!("Engine shut down");
        Ok(())
    }

    /// Sets a configuration key to a string value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown keys or invalid values,
    /// [`Error::ReadOnlyConfig`] for engine-maintained keys,
    /// [`Error::UnknownDatabase`] / [`Error::UnknownField`] when the key names
    /// something undefined, and [`Error::Offline`] after shutdown.
    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Offline { status: Status::Shutdown.to_string() });
        }

        if key.starts_with("engine.") {
            return Err(Error::ReadOnlyConfig { key: key.to_string() });
        }
        if key == SCHEDULER_THREADS || key == MEMORY_LIMIT {
            let parsed = value.parse::<u64>().map_err(|_| Error::InvalidConfig {
                key: key.to_string(),
                reason: format!("'{value}' is not a non-negative integer"),
            })?;
            self.inner.state.write().settings.insert(key.to_string(), parsed.to_string());
            return Ok(());
        }
        if key == "db" {
            return self.define_database(value);
        }

        let Some((name, param)) = key.strip_prefix("db.").and_then(|rest| rest.split_once('.'))
        else {
            return Err(Error::InvalidConfig {
                key: key.to_string(),
                reason: "unknown configuration key".to_string(),
            });
        };
        let database = self.database(name)?;

        match param {
            "id" => Err(Error::ReadOnlyConfig { key: key.to_string() }),
            "scheme" => database.add_field(value),
            _ => match param.strip_prefix("scheme.") {
                Some(field) => database.set_field_spec(field, FieldSpec::parse(value)?),
                None => {
                    validate_db_param(key, param, value)?;
                    database.set_param(param, value);
                    Ok(())
                },
            },
        }
    }

    /// Sets a configuration key to an integer value.
    ///
    /// # Errors
    ///
    /// Same as [`set_string`](Self::set_string).
    pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string())
    }

    /// Returns the live value of a configuration key.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.configuration().get(key).map(str::to_string)
    }

    /// Returns the live value of a configuration key parsed as an integer.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.configuration().get(key).and_then(|v| v.parse().ok())
    }

    /// Snapshot of every live configuration pair.
    pub fn configuration(&self) -> Configuration {
        let state = self.inner.state.read();
        let mut entries = state.settings.clone();
        entries.insert("engine.version".to_string(), ENGINE_VERSION.to_string());
        entries.insert("engine.status".to_string(), state.status.to_string());
        if let Some(path) = &self.inner.path {
            entries.insert("engine.path".to_string(), path.display().to_string());
        }
        for database in state.databases.values() {
            database.export_config(&mut entries);
        }
        Configuration::new(entries)
    }

    /// Resolves a configured object by path; only `db.<name>` is supported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDatabase`] if the database is not defined, or
    /// [`Error::InvalidConfig`] for any other path.
    pub fn get_object(&self, path: &str) -> Result<DatabaseHandle> {
        let name = path.strip_prefix("db.").filter(|name| !name.contains('.')).ok_or_else(|| {
            Error::InvalidConfig { key: path.to_string(), reason: "not an object path".to_string() }
        })?;
        let database = self.database(name)?;
        Ok(DatabaseHandle::new(Arc::clone(&self.inner), database))
    }

    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine is not online.
    pub fn transaction(&self) -> Result<Transaction> {
        self.inner.ensure_online()?;
        Ok(Transaction::new(Arc::clone(&self.inner)))
    }

    fn database(&self, name: &str) -> Result<Arc<DatabaseInner>> {
        self.inner
            .state
            .read()
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDatabase { name: name.to_string() })
    }

    /// Defines a database, assigning the next id. Defining an existing name is a no-op.
    fn define_database(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('.') {
            return Err(Error::InvalidConfig {
                key: "db".to_string(),
                reason: format!("invalid database name '{name}'"),
            });
        }

        let mut state = self.inner.state.write();
        if state.databases.contains_key(name) {
            return Ok(());
        }

        let id = state.next_id;
        let database = DatabaseInner::new(id, name, self.inner.backend_for(name)?);
        if state.status == Status::Online {
            database.load()?;
        }
        tracing::debug!(database = name, id, records = database.record_count(), "Defined database");

        state.databases.insert(name.to_string(), Arc::new(database));
        state.next_id += 1;
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.inner.path)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::types::SortOrder;

    fn users_engine() -> Engine {
        let engine = Engine::in_memory().unwrap();
        engine.set_string("db", "users").unwrap();
        engine.set_string("db.users.scheme", "name").unwrap();
        engine.set_string("db.users.scheme.name", "string,key(0)").unwrap();
        engine.set_string("db.users.scheme", "age").unwrap();
        engine.set_string("db.users.scheme.age", "u8").unwrap();
        engine
    }

    #[test]
    fn test_configuration_reflects_definitions() {
        let engine = users_engine();
        engine.set_string("db.users.compression", "zstd").unwrap();

        let config = engine.configuration();
        assert_eq!(config.get("engine.version"), Some(ENGINE_VERSION));
        assert_eq!(config.get("engine.status"), Some("offline"));
        assert_eq!(config.get("db.users.id"), Some("0"));
        assert_eq!(config.get("db.users.scheme.name"), Some("string,key(0)"));
        assert_eq!(config.get("db.users.scheme.age"), Some("u8"));
        assert_eq!(config.get("db.users.compression"), Some("zstd"));
        assert_eq!(engine.get_int("db.users.id"), Some(0));
    }

    #[test]
    fn test_ids_are_assigned_in_definition_order() {
        let engine = Engine::in_memory().unwrap();
        engine.set_string("db", "a").unwrap();
        engine.set_string("db", "b").unwrap();
        engine.set_string("db", "a").unwrap();
        assert_eq!(engine.get_int("db.a.id"), Some(0));
        assert_eq!(engine.get_int("db.b.id"), Some(1));
    }

    #[test]
    fn test_rejected_keys() {
        let engine = users_engine();
        assert!(matches!(engine.set_string("engine.status", "x"), Err(Error::ReadOnlyConfig { .. })));
        assert!(matches!(engine.set_string("db.users.id", "4"), Err(Error::ReadOnlyConfig { .. })));
        assert!(matches!(engine.set_string("nonsense", "1"), Err(Error::InvalidConfig { .. })));
        assert!(matches!(engine.set_string("db.ghost.scheme", "f"), Err(Error::UnknownDatabase { .. })));
        assert!(matches!(
            engine.set_string("db.users.scheme.ghost", "u8"),
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            engine.set_string("db.users.compression", "gzip"),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(engine.set_string("db", "a.b"), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_records_require_online_engine() {
        let engine = users_engine();
        let users = engine.get_object("db.users").unwrap();
        let mut record = users.document();
        record.set_string("name", "ann");
        assert!(matches!(users.set(&record), Err(Error::Offline { .. })));

        engine.open().unwrap();
        users.set(&record).unwrap();

        engine.close().unwrap();
        assert!(engine.is_closed());
        assert!(matches!(users.get(&record), Err(Error::Offline { .. })));
        assert!(engine.open().is_err());
    }

    #[test]
    fn test_set_get_delete() {
        let engine = users_engine();
        engine.open().unwrap();
        let users = engine.get_object("db.users").unwrap();

        let mut record = users.document();
        record.set_string("name", "ann");
        record.set_int("age", 30);
        users.set(&record).unwrap();

        let mut lookup = users.document();
        lookup.set_string("name", "ann");
        let found = users.get(&lookup).unwrap();
        assert_eq!(found.get_int("age"), Some(30));

        lookup.set_string("name", "bob");
        assert!(matches!(users.get(&lookup), Err(Error::KeyNotFound)));

        lookup.set_string("name", "ann");
        assert!(users.delete(&lookup).unwrap());
        assert!(!users.delete(&lookup).unwrap());
        assert!(users.is_empty());
    }

    #[test]
    fn test_cursor_order() {
        let engine = Engine::in_memory().unwrap();
        engine.set_string("db", "scores").unwrap();
        engine.set_string("db.scores.scheme", "score").unwrap();
        engine.set_string("db.scores.scheme.score", "u32_rev,key(0)").unwrap();
        engine.open().unwrap();
        let scores = engine.get_object("db.scores").unwrap();

        for score in [5u64, 100, 42] {
            let mut record = scores.document();
            record.set_int("score", score);
            scores.set(&record).unwrap();
        }

        let seen: Vec<_> = scores
            .cursor(SortOrder::Ascending)
            .unwrap()
            .map(|r| r.get_int("score").unwrap())
            .collect();
        assert_eq!(seen, vec![100, 42, 5]);

        let seen: Vec<_> = scores
            .cursor(SortOrder::Descending)
            .unwrap()
            .map(|r| r.get_int("score").unwrap())
            .collect();
        assert_eq!(seen, vec![5, 42, 100]);
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let engine = users_engine();
        engine.open().unwrap();
        let users = engine.get_object("db.users").unwrap();

        let mut record = users.document();
        record.set_string("name", "ann");
        record.set_int("age", 19);

        let mut txn = engine.transaction().unwrap();
        txn.set(&record).unwrap();
        assert_eq!(txn.get(&record).unwrap().get_int("age"), Some(19));
        assert!(matches!(users.get(&record), Err(Error::KeyNotFound)));
        txn.rollback();
        assert!(matches!(users.get(&record), Err(Error::KeyNotFound)));

        {
            let mut txn = engine.transaction().unwrap();
            txn.set(&record).unwrap();
            // Dropped without commit
        }
        assert!(users.is_empty());

        let mut txn = engine.transaction().unwrap();
        txn.set(&record).unwrap();
        assert_eq!(txn.len(), 1);
        txn.commit().unwrap();
        assert_eq!(users.get(&record).unwrap().get_int("age"), Some(19));
    }

    #[test]
    fn test_get_object_paths() {
        let engine = users_engine();
        assert_eq!(engine.get_object("db.users").unwrap().name(), "users");
        assert!(matches!(engine.get_object("db.ghost"), Err(Error::UnknownDatabase { .. })));
        assert!(matches!(engine.get_object("users"), Err(Error::InvalidConfig { .. })));
        assert!(matches!(engine.get_object("db.users.scheme"), Err(Error::InvalidConfig { .. })));
    }
}
