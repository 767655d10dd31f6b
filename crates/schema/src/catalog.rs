//! The system catalog: durable record of every database definition.
//!
//! The engine forgets its configuration on restart. The catalog, a database
//! in its own engine under `<path>/_system`, stores each user database's
//! definition pairs and replays them into the data engine when an
//! environment is created:
//!
//! ```text
//! id (key 0) | name (key 1) | index (key 2) | key                  | value
//! -----------+--------------+---------------+----------------------+----------------
//! 0          | users        | 0             | db                   | users
//! 0          | users        | 1             | db.users.scheme      | name
//! 0          | users        | 2             | db.users.scheme.name | string,key(0)
//! ```
//!
//! Replay applies each database's pairs in `index` order, databases in `id`
//! order, then checks that the engine assigned every database the id the
//! catalog recorded. Record keys depend on that identity, so a mismatch is
//! fatal.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use quill_store::{Engine, IntWidth, SortOrder};
use snafu::ResultExt;

use crate::{
    config::CatalogConfig,
    database::{Database, EngineSlot},
    document::Document,
    error::{EngineSnafu, Error, Result},
    field::{Field, Value},
    schema::{ConfigPair, DatabaseParams, Schema},
    transaction::Transaction,
};

/// Directory of the catalog engine, relative to the environment path.
pub const SYSTEM_DIR: &str = "_system";

/// Name of the catalog database inside the catalog engine.
pub const CATALOG_DATABASE: &str = "catalog";

/// One persisted configuration pair of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Engine-assigned database id.
    pub id: u16,
    /// Database name.
    pub name: String,
    /// Position of the pair in the database's definition.
    pub index: u16,
    /// Configuration key.
    pub key: String,
    /// Configuration value.
    pub value: String,
}

impl CatalogEntry {
    fn from_document(document: &Document) -> Result<Self> {
        let read = |field: &str| {
            document.get(field).map_err(|e| Error::CorruptCatalog {
                field: field.to_string(),
                reason: e.to_string(),
            })
        };
        let int = |field: &str| -> Result<u16> {
            let value = read(field)?;
            value.as_u64().and_then(|v| u16::try_from(v).ok()).ok_or_else(|| Error::CorruptCatalog {
                field: field.to_string(),
                reason: format!("expected a 16-bit id, found {value}"),
            })
        };
        let text = |field: &str| -> Result<String> {
            match read(field)? {
                Value::String(s) => Ok(s),
                other => Err(Error::CorruptCatalog {
                    field: field.to_string(),
                    reason: format!("expected a string, found {other}"),
                }),
            }
        };
        Ok(Self {
            id: int("id")?,
            name: text("name")?,
            index: int("index")?,
            key: text("key")?,
            value: text("value")?,
        })
    }

    fn write_to(&self, document: &mut Document) -> Result<()> {
        document.set("id", self.id)?;
        document.set("name", self.name.as_str())?;
        document.set("index", self.index)?;
        document.set("key", self.key.as_str())?;
        document.set("value", self.value.as_str())
    }
}

/// The fixed schema of catalog entries.
pub fn catalog_schema() -> Result<Schema> {
    Schema::builder("CatalogEntry")
        .field("id", Field::uint(IntWidth::W16).key(0))
        .field("name", Field::string().key(1))
        .field("index", Field::uint(IntWidth::W16).key(2))
        .field("key", Field::string())
        .field("value", Field::string())
        .build()
}

/// Handle to an open catalog.
pub struct Catalog {
    path: PathBuf,
    engine: Engine,
    database: Database,
}

impl Catalog {
    /// Opens (creating if needed) the catalog of the environment at `path`.
    ///
    /// The catalog database is configured directly from `config`; its own
    /// definition is fixed and not recorded anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the catalog engine cannot be created or
    /// its snapshot is corrupted.
    pub fn open(path: &Path, config: &CatalogConfig) -> Result<Self> {
        let path = path.join(SYSTEM_DIR);
        let engine = Engine::create_with_config(&path, config.engine_config()?).context(EngineSnafu)?;

        let schema = Arc::new(catalog_schema()?);
        let params = DatabaseParams::new().compression(config.compression);
        for pair in schema.define_db(CATALOG_DATABASE, &params)? {
            engine.set_string(&pair.key, &pair.value).context(EngineSnafu)?;
        }
        engine.open().context(EngineSnafu)?;

        let slot = EngineSlot::new(path.clone());
        slot.bind(engine.clone());
        let database = Database::new(CATALOG_DATABASE, schema, slot);
        tracing::debug!(path = %path.display(), entries = database.len()?, "Catalog opened");

        Ok(Self { path, engine, database })
    }

    /// Location of the catalog engine.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in `(id, name, index)` order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptCatalog`] if an entry cannot be decoded.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        self.database
            .cursor(SortOrder::Ascending)?
            .map(|document| CatalogEntry::from_document(&document))
            .collect()
    }

    /// Entries of database `id`, in index order.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be decoded.
    pub fn entries_for(&self, id: u16) -> Result<Vec<CatalogEntry>> {
        Ok(self.entries()?.into_iter().filter(|e| e.id == id).collect())
    }

    /// Appends `pairs` for database `id`, numbering them from `first_index`,
    /// in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the indices overflow, or an engine error
    /// if the commit fails; nothing is written then.
    pub fn append(&self, id: u16, name: &str, first_index: u16, pairs: &[ConfigPair]) -> Result<()> {
        let mut txn = Transaction::new(self.engine.clone())?;
        for (offset, pair) in pairs.iter().enumerate() {
            let index = u16::try_from(usize::from(first_index) + offset).map_err(|_| Error::Config {
                message: format!("database '{name}' has too many catalog entries"),
            })?;
            let entry = CatalogEntry {
                id,
                name: name.to_string(),
                index,
                key: pair.key.clone(),
                value: pair.value.clone(),
            };
            let mut document = self.database.document()?;
            entry.write_to(&mut document)?;
            txn.set(&document)?;
        }
        txn.commit()?;
        tracing::debug!(database = name, id, first_index, entries = pairs.len(), "Catalog entries appended");
        Ok(())
    }

    /// Re-applies every recorded definition to `engine` and verifies ids.
    ///
    /// Returns the replayed databases by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine rejects a pair, or
    /// [`Error::IdentityMismatch`] if the engine assigns a database an id
    /// other than the recorded one.
    pub fn replay(&self, engine: &Engine) -> Result<BTreeMap<u16, String>> {
        let mut groups: BTreeMap<u16, Vec<CatalogEntry>> = BTreeMap::new();
        for entry in self.entries()? {
            groups.entry(entry.id).or_default().push(entry);
        }

        let mut replayed = BTreeMap::new();
        for (id, mut entries) in groups {
            entries.sort_by_key(|e| e.index);
            let name = entries.first().map(|e| e.name.clone()).unwrap_or_default();
            for entry in &entries {
                if entry.name != name {
                    return Err(Error::IdentityMismatch {
                        database: entry.name.clone(),
                        catalog_id: id,
                        engine_id: None,
                    });
                }
                engine.set_string(&entry.key, &entry.value).context(EngineSnafu)?;
            }
            tracing::debug!(database = %name, id, entries = entries.len(), "Replayed catalog entries");
            replayed.insert(id, name);
        }

        for (id, name) in &replayed {
            let engine_id = engine.get_int(&format!("db.{name}.id"));
            if engine_id != Some(i64::from(*id)) {
                return Err(Error::IdentityMismatch {
                    database: name.clone(),
                    catalog_id: *id,
                    engine_id,
                });
            }
        }

        tracing::info!(path = %self.path.display(), databases = replayed.len(), "Catalog replayed");
        Ok(replayed)
    }

    /// Flushes and closes the catalog engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the final snapshot cannot be written.
    pub fn close(&self) -> Result<()> {
        self.engine.close().context(EngineSnafu)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("path", &self.path).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn pairs(name: &str) -> Vec<ConfigPair> {
        Schema::builder("S")
            .field("k", Field::uint(IntWidth::W32).key(0))
            .field("v", Field::string())
            .build()
            .unwrap()
            .define_db(name, &DatabaseParams::new())
            .unwrap()
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();

        catalog.append(1, "beta", 0, &pairs("beta")).unwrap();
        catalog.append(0, "alpha", 0, &pairs("alpha")).unwrap();

        let entries = catalog.entries().unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].name, "alpha");
        assert_eq!(entries[0].key, "db");
        assert_eq!(entries[4].index, 4);
        assert_eq!(entries[5].name, "beta");
        assert_eq!(catalog.entries_for(1).unwrap().len(), 5);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();
            catalog.append(0, "alpha", 0, &pairs("alpha")).unwrap();
            catalog.close().unwrap();
        }
        let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();
        assert_eq!(catalog.entries().unwrap().len(), 5);
        assert!(catalog.path().ends_with(SYSTEM_DIR));
    }

    #[test]
    fn test_replay_reconstructs_configuration() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();
        catalog.append(0, "alpha", 0, &pairs("alpha")).unwrap();
        catalog.append(1, "beta", 0, &pairs("beta")).unwrap();

        let engine = Engine::in_memory().unwrap();
        let replayed = catalog.replay(&engine).unwrap();
        assert_eq!(replayed.get(&1).map(String::as_str), Some("beta"));
        assert_eq!(engine.get_string("db.beta.scheme.k"), Some("u32,key(0)".to_string()));
        assert_eq!(engine.get_int("db.beta.id"), Some(1));
    }

    #[test]
    fn test_incomplete_row_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();
        catalog.append(0, "alpha", 0, &pairs("alpha")).unwrap();

        let mut row = catalog.database.document().unwrap();
        row.set("id", 1u16).unwrap();
        row.set("name", "beta").unwrap();
        row.set("index", 0u16).unwrap();
        row.set("key", "db").unwrap();
        catalog.database.set(&row).unwrap();

        let err = catalog.entries().unwrap_err();
        assert!(
            matches!(&err, Error::CorruptCatalog { field, .. } if field == "value"),
            "unexpected error: {err}"
        );
        assert!(matches!(catalog.replay(&Engine::in_memory().unwrap()), Err(Error::CorruptCatalog { .. })));
    }

    #[test]
    fn test_replay_detects_identity_mismatch() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), &CatalogConfig::default()).unwrap();
        catalog.append(3, "alpha", 0, &pairs("alpha")).unwrap();

        let engine = Engine::in_memory().unwrap();
        let err = catalog.replay(&engine).unwrap_err();
        assert!(matches!(
            err,
            Error::IdentityMismatch { catalog_id: 3, engine_id: Some(0), .. }
        ));
    }
}
