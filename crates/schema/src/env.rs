//! Environments: one engine, its catalog and its declared databases.
//!
//! # Lifecycle
//!
//! ```text
//!  new / with_config ──► create cycle ──► open ──► database / transact ...
//!                         (engine,          │
//!                          catalog,         ▼
//!                          replay)        close ──► open (new create cycle)
//! ```
//!
//! A create cycle builds a fresh engine, opens the catalog, replays it, and
//! re-declares every database declared through this environment. All of it
//! runs under the per-path lock from [`PathLockRegistry`].

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use quill_store::{Configuration, Engine};
use snafu::ResultExt;

use crate::{
    catalog::{Catalog, CatalogEntry},
    compat::{self, Compatibility},
    config::EnvironmentConfig,
    database::{Database, EngineSlot},
    error::{EngineSnafu, Error, IoSnafu, Result},
    lock::{PathLock, PathLockRegistry},
    schema::{ConfigPair, DatabaseParams, Schema},
    transaction::Transaction,
};

/// A database declared through [`Environment::database`], re-declared on reopen.
struct Declaration {
    name: String,
    schema: Arc<Schema>,
    params: DatabaseParams,
}

#[derive(Default)]
struct EnvState {
    catalog: Option<Catalog>,
    declarations: Vec<Declaration>,
}

/// Owner of the engine and catalog at one storage path.
///
/// # Example
///
/// ```no_run
/// use quill_schema::{DatabaseParams, Environment, Field, IntWidth, Schema};
///
/// let users = Schema::builder("Users")
///     .field("name", Field::string().key(0))
///     .field("age", Field::uint(IntWidth::W8))
///     .build()?;
///
/// let env = Environment::new("/var/lib/app")?;
/// env.open()?;
/// let db = env.database("users", users, &DatabaseParams::new())?;
///
/// let mut ann = db.document()?;
/// ann.set("name", "Ann")?;
/// ann.set("age", 30u8)?;
/// db.set(&ann)?;
/// # Ok::<(), quill_schema::Error>(())
/// ```
pub struct Environment {
    path: PathBuf,
    config: EnvironmentConfig,
    lock: PathLock,
    slot: EngineSlot,
    state: Mutex<EnvState>,
}

impl Environment {
    /// Creates an environment at `path` with default configuration.
    ///
    /// The engine is configured from the catalog but not yet open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created, or any error
    /// of the catalog replay, including [`Error::IdentityMismatch`].
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, EnvironmentConfig::default())
    }

    /// Creates an environment at `path` with custom configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), plus [`Error::Config`] for an invalid
    /// configuration.
    pub fn with_config(path: impl AsRef<Path>, config: EnvironmentConfig) -> Result<Self> {
        config.validate()?;
        let requested = path.as_ref();
        fs::create_dir_all(requested).context(IoSnafu { path: requested })?;
        let path = fs::canonicalize(requested).context(IoSnafu { path: requested })?;

        let env = Self {
            lock: PathLockRegistry::global().lock_for(&path),
            slot: EngineSlot::new(path.clone()),
            path,
            config,
            state: Mutex::new(EnvState::default()),
        };
        {
            let _guard = env.lock.lock();
            let mut state = env.state.lock();
            env.create(&mut state)?;
        }
        Ok(env)
    }

    /// Builds a fresh engine and catalog, replays the catalog, and re-declares
    /// every known database.
    fn create(&self, state: &mut EnvState) -> Result<()> {
        let engine =
            Engine::create_with_config(&self.path, self.config.engine_config()?).context(EngineSnafu)?;
        let catalog = Catalog::open(&self.path, &self.config.catalog)?;

        let setup = catalog.replay(&engine).and_then(|_| {
            state
                .declarations
                .iter()
                .try_for_each(|d| self.declare(&engine, &catalog, &d.name, &d.schema, &d.params))
        });
        if let Err(e) = setup {
            // Best effort: the setup error is the one worth reporting
            let _ = catalog.close();
            let _ = engine.close();
            return Err(e);
        }

        tracing::info!(
            path = %self.path.display(),
            databases = state.declarations.len(),
            "Environment created"
        );
        state.catalog = Some(catalog);
        self.slot.bind(engine);
        Ok(())
    }

    /// Runs the compatibility check for one declaration and applies its outcome.
    fn declare(
        &self,
        engine: &Engine,
        catalog: &Catalog,
        name: &str,
        schema: &Schema,
        params: &DatabaseParams,
    ) -> Result<()> {
        let pairs = schema.define_db(name, params)?;

        match compat::check(name, &pairs, &engine.configuration()) {
            Compatibility::Absent => {
                rehearse(name, &pairs, false)?;
                self.apply(engine, catalog, name, 0, &pairs)?;
                let id = self.catalog_id(engine, name)?;
                tracing::info!(database = name, id, "Database created");
            },
            Compatibility::Compatible => {
                tracing::debug!(database = name, "Database matches its live definition");
            },
            Compatibility::Widened(added) => {
                rehearse(name, &added, true)?;
                let id = self.catalog_id(engine, name)?;
                let existing = catalog.entries_for(id)?.len();
                let first_index = u16::try_from(existing).map_err(|_| Error::Config {
                    message: format!("database '{name}' has too many catalog entries"),
                })?;
                self.apply(engine, catalog, name, first_index, &added)?;
                tracing::info!(database = name, id, fields = added.len() / 2, "Database widened");
            },
            Compatibility::Incompatible { reason } => {
                tracing::warn!(database = name, %reason, "Rejected incompatible declaration");
                return Err(Error::IncompatibleSchema { database: name.to_string(), reason });
            },
        }
        Ok(())
    }

    /// Writes `pairs` to the engine and records them in the catalog.
    ///
    /// Whatever prefix the engine accepted is recorded even if a later pair
    /// fails, so that the catalog always knows every assigned id.
    fn apply(
        &self,
        engine: &Engine,
        catalog: &Catalog,
        name: &str,
        first_index: u16,
        pairs: &[ConfigPair],
    ) -> Result<()> {
        let mut applied = 0;
        let mut outcome = Ok(());
        for pair in pairs {
            if let Err(source) = engine.set_string(&pair.key, &pair.value) {
                outcome = Err(Error::Engine { source });
                break;
            }
            applied += 1;
        }

        if applied > 0 {
            let id = self.catalog_id(engine, name)?;
            catalog.append(id, name, first_index, &pairs[..applied])?;
        }
        if let Err(e) = &outcome {
            tracing::warn!(database = name, applied, error = %e, "Engine rejected part of a definition");
        }
        outcome
    }

    fn catalog_id(&self, engine: &Engine, name: &str) -> Result<u16> {
        let id = engine.get_int(&format!("db.{name}.id"));
        id.and_then(|id| u16::try_from(id).ok()).ok_or_else(|| Error::Config {
            message: format!("engine id {id:?} of database '{name}' does not fit the catalog"),
        })
    }

    /// Storage path (canonical).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration the environment was created with.
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Opens the environment. A no-op if already open; after
    /// [`close`](Self::close) it runs a full create cycle first.
    ///
    /// # Errors
    ///
    /// Returns any error of the create cycle, or [`Error::Engine`] if the
    /// engine cannot load its data.
    pub fn open(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut state = self.state.lock();
        if !self.slot.is_bound() {
            self.create(&mut state)?;
        }
        self.slot.current()?.open().context(EngineSnafu)?;
        tracing::debug!(path = %self.path.display(), "Environment open");
        Ok(())
    }

    /// Returns true if the engine is bound and online.
    pub fn is_open(&self) -> bool {
        self.slot.current().map(|engine| engine.is_open()).unwrap_or(false)
    }

    /// Returns true after [`close`](Self::close) and until the next open.
    pub fn is_closed(&self) -> bool {
        !self.slot.is_bound()
    }

    /// Flushes and releases the engine and the catalog. Closing twice is a no-op.
    ///
    /// Databases obtained from this environment return [`Error::Closed`]
    /// until it is reopened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if a final snapshot cannot be written; both
    /// handles are released regardless.
    pub fn close(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut state = self.state.lock();
        let engine = self.slot.take();
        let catalog = state.catalog.take();
        if engine.is_none() && catalog.is_none() {
            return Ok(());
        }

        let engine_result = engine.map_or(Ok(()), |engine| engine.close().context(EngineSnafu));
        let catalog_result = catalog.map_or(Ok(()), |catalog| catalog.close());
        tracing::debug!(path = %self.path.display(), "Environment closed");
        engine_result.and(catalog_result)
    }

    /// Declares database `name` with `schema` and returns a handle to it.
    ///
    /// A new database is defined in the engine and recorded in the catalog.
    /// Redeclaring an existing database is accepted when it keeps every
    /// existing field and parameter; new value fields are added and recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleSchema`] if the declaration conflicts
    /// with the live definition, [`Error::Schema`] for an invalid name or
    /// parameter, or [`Error::Closed`] if the environment is closed.
    pub fn database(
        &self,
        name: &str,
        schema: impl Into<Arc<Schema>>,
        params: &DatabaseParams,
    ) -> Result<Database> {
        let schema = schema.into();
        let _guard = self.lock.lock();
        let mut state = self.state.lock();
        let engine = self.slot.current()?;
        let catalog = state.catalog.as_ref().ok_or_else(|| Error::Closed { path: self.path.clone() })?;

        self.declare(&engine, catalog, name, &schema, params)?;

        let declaration =
            Declaration { name: name.to_string(), schema: Arc::clone(&schema), params: params.clone() };
        match state.declarations.iter_mut().find(|d| d.name == name) {
            Some(existing) => *existing = declaration,
            None => state.declarations.push(declaration),
        }
        Ok(Database::new(name, schema, self.slot.clone()))
    }

    /// Live engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn configuration(&self) -> Result<Configuration> {
        Ok(self.slot.current()?.configuration())
    }

    /// Live value of an engine configuration key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slot.current()?.get_string(key))
    }

    /// Live value of an engine configuration key, parsed as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.slot.current()?.get_int(key))
    }

    /// Sets an engine configuration key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine rejects the key or value, or
    /// [`Error::Closed`] if the environment is closed.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slot.current()?.set_string(key, value).context(EngineSnafu)
    }

    /// Sets an engine configuration key to an integer.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.slot.current()?.set_int(key, value).context(EngineSnafu)
    }

    /// All catalog entries, in `(id, name, index)` order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn catalog_entries(&self) -> Result<Vec<CatalogEntry>> {
        let state = self.state.lock();
        let catalog = state.catalog.as_ref().ok_or_else(|| Error::Closed { path: self.path.clone() })?;
        catalog.entries()
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed, or
    /// [`Error::Engine`] if it is not open.
    pub fn transaction(&self) -> Result<Transaction> {
        Transaction::new(self.slot.current()?)
    }

    /// Runs `f` in a transaction, committing if it returns `Ok` and rolling
    /// back if it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of the commit.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut txn = self.transaction()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            },
            Err(e) => {
                txn.rollback();
                Err(e)
            },
        }
    }
}

/// Applies `pairs` to a scratch in-memory engine, so that a definition the
/// engine would reject fails before the live engine assigns an id.
///
/// With `existing`, the database is defined first, as when widening.
fn rehearse(name: &str, pairs: &[ConfigPair], existing: bool) -> Result<()> {
    let scratch = Engine::in_memory().context(EngineSnafu)?;
    if existing {
        scratch.set_string("db", name).context(EngineSnafu)?;
    }
    for pair in pairs {
        scratch.set_string(&pair.key, &pair.value).context(EngineSnafu)?;
    }
    Ok(())
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close environment");
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
