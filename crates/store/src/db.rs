//! Named databases: scheme, committed records, and their persistence.
//!
//! A database is created by setting the `db` configuration key. Its records
//! are loaded from the last snapshot when the engine comes online, and live
//! in an ordered map keyed by the composite key encoding from
//! [`types`](crate::types); every commit replaces the database snapshot in
//! its [`StorageBackend`].

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use snafu::ResultExt;

use crate::{
    backend::{self, StorageBackend},
    engine::EngineInner,
    error::{CodecSnafu, Error, Result},
    record::{RawRecord, StoredRecord},
    types::{FieldSpec, SortOrder, encode_key_component},
};

/// Committed records by encoded key.
pub(crate) type Records = BTreeMap<Vec<u8>, StoredRecord>;

/// One field of a database scheme.
#[derive(Debug, Clone)]
struct SchemeField {
    name: String,
    spec: FieldSpec,
    /// False until a type has been assigned through `db.<name>.scheme.<field>`.
    declared: bool,
}

#[derive(Debug, Default)]
struct Scheme {
    fields: Vec<SchemeField>,
    params: BTreeMap<String, String>,
}

impl Scheme {
    fn field(&self, name: &str) -> Option<&SchemeField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Key fields ordered by key position.
    fn key_fields(&self) -> Vec<&SchemeField> {
        let mut keys: Vec<_> = self.fields.iter().filter(|f| f.spec.key_index.is_some()).collect();
        keys.sort_by_key(|f| f.spec.key_index);
        keys
    }
}

/// Shared state of one database.
pub(crate) struct DatabaseInner {
    id: u32,
    name: String,
    scheme: RwLock<Scheme>,
    records: RwLock<Records>,
    backend: Box<dyn StorageBackend>,
}

impl DatabaseInner {
    /// Creates an empty database; records are read by [`load`](Self::load).
    pub(crate) fn new(id: u32, name: &str, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            id,
            name: name.to_string(),
            scheme: RwLock::new(Scheme::default()),
            records: RwLock::new(BTreeMap::new()),
            backend,
        }
    }

    /// Replaces the in-memory records with the last committed snapshot.
    pub(crate) fn load(&self) -> Result<()> {
        let records = match self.backend.read_snapshot()? {
            Some(data) => {
                let payload = backend::unseal(&self.name, &data)?;
                let entries: Vec<(Vec<u8>, StoredRecord)> =
                    postcard::from_bytes(payload).context(CodecSnafu)?;
                entries.into_iter().collect()
            },
            None => BTreeMap::new(),
        };
        *self.records.write() = records;
        Ok(())
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Appends a field to the scheme. Adding an existing field is a no-op.
    pub(crate) fn add_field(&self, field: &str) -> Result<()> {
        if field.is_empty() || field.contains('.') {
            return Err(Error::InvalidConfig {
                key: format!("db.{}.scheme", self.name),
                reason: format!("invalid field name '{field}'"),
            });
        }

        let mut scheme = self.scheme.write();
        if scheme.field(field).is_none() {
            scheme.fields.push(SchemeField {
                name: field.to_string(),
                spec: FieldSpec::default(),
                declared: false,
            });
        }
        Ok(())
    }

    /// Assigns the type of a field.
    ///
    /// Once records exist, key fields can no longer be added and declared
    /// fields can no longer change type.
    pub(crate) fn set_field_spec(&self, field: &str, spec: FieldSpec) -> Result<()> {
        let has_records = self.record_count() > 0;
        let mut scheme = self.scheme.write();
        let locked = |reason: &str| Error::SchemeLocked {
            database: self.name.clone(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if let Some(index) = spec.key_index {
            let clash = scheme
                .fields
                .iter()
                .any(|f| f.name != field && f.declared && f.spec.key_index == Some(index));
            if clash {
                return Err(locked("key position already taken"));
            }
        }

        let entry = scheme.fields.iter_mut().find(|f| f.name == field).ok_or_else(|| {
            Error::UnknownField { database: self.name.clone(), field: field.to_string() }
        })?;

        if entry.declared && entry.spec == spec {
            return Ok(());
        }
        if has_records {
            if entry.declared {
                return Err(locked("database already holds records"));
            }
            if spec.key_index.is_some() {
                return Err(locked("cannot add a key field to a database holding records"));
            }
        }

        entry.spec = spec;
        entry.declared = true;
        Ok(())
    }

    pub(crate) fn set_param(&self, param: &str, value: &str) {
        self.scheme.write().params.insert(param.to_string(), value.to_string());
    }

    /// Adds this database's live configuration pairs to `out`.
    pub(crate) fn export_config(&self, out: &mut BTreeMap<String, String>) {
        let scheme = self.scheme.read();
        out.insert(format!("db.{}.id", self.name), self.id.to_string());
        for field in &scheme.fields {
            out.insert(format!("db.{}.scheme.{}", self.name, field.name), field.spec.to_string());
        }
        for (param, value) in &scheme.params {
            out.insert(format!("db.{}.{param}", self.name), value.clone());
        }
    }

    /// Validates every field of `record` and returns its encoded key.
    pub(crate) fn key_of(&self, record: &StoredRecord) -> Result<Vec<u8>> {
        let scheme = self.scheme.read();

        for (name, value) in record {
            let field = scheme.field(name).ok_or_else(|| Error::UnknownField {
                database: self.name.clone(),
                field: name.clone(),
            })?;
            field.spec.wire_type.check(name, value)?;
        }

        let mut key = Vec::new();
        for field in scheme.key_fields() {
            let value = record.get(&field.name).ok_or_else(|| Error::MissingKey {
                database: self.name.clone(),
                field: field.name.clone(),
            })?;
            encode_key_component(field.spec.wire_type, value, &mut key);
        }
        Ok(key)
    }

    pub(crate) fn lookup(&self, key: &[u8]) -> Option<StoredRecord> {
        self.records.read().get(key).cloned()
    }

    /// Returns the committed records with `writes` applied; `None` deletes the key.
    ///
    /// The live records are untouched until [`install`](Self::install).
    pub(crate) fn stage(
        &self,
        writes: impl IntoIterator<Item = (Vec<u8>, Option<StoredRecord>)>,
    ) -> Records {
        let mut records = self.records.read().clone();
        for (key, write) in writes {
            match write {
                Some(record) => {
                    records.insert(key, record);
                },
                None => {
                    records.remove(&key);
                },
            }
        }
        records
    }

    /// Replaces the live records with a staged set.
    pub(crate) fn install(&self, records: Records) {
        *self.records.write() = records;
    }

    /// Writes `records` as the new snapshot.
    pub(crate) fn write_snapshot(&self, records: &Records, sync: bool) -> Result<()> {
        let entries: Vec<(&Vec<u8>, &StoredRecord)> = records.iter().collect();
        let payload = postcard::to_allocvec(&entries).context(CodecSnafu)?;
        self.backend.write_snapshot(&backend::seal(&payload))?;
        if sync {
            self.backend.sync()?;
        }
        Ok(())
    }

    /// Writes the live records as a new snapshot.
    pub(crate) fn persist(&self, sync: bool) -> Result<()> {
        let records = self.records.read();
        self.write_snapshot(&records, sync)
    }

    fn ordered(&self, order: SortOrder) -> Vec<StoredRecord> {
        let records = self.records.read();
        match order {
            SortOrder::Ascending => records.values().cloned().collect(),
            SortOrder::Descending => records.values().rev().cloned().collect(),
        }
    }
}

/// Handle to a named database, obtained from [`Engine::get_object`](crate::Engine::get_object).
#[derive(Clone)]
pub struct DatabaseHandle {
    engine: Arc<EngineInner>,
    inner: Arc<DatabaseInner>,
}

impl DatabaseHandle {
    pub(crate) fn new(engine: Arc<EngineInner>, inner: Arc<DatabaseInner>) -> Self {
        Self { engine, inner }
    }

    /// Engine-assigned database id.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.inner.record_count()
    }

    /// Returns true if the database holds no committed records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an empty record bound to this database.
    pub fn document(&self) -> RawRecord {
        RawRecord::new(Arc::clone(&self.inner))
    }

    /// Writes a record in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine is not online, or a validation
    /// error if the record does not match the scheme.
    pub fn set(&self, record: &RawRecord) -> Result<()> {
        self.check_record(record)?;
        let key = self.inner.key_of(record.stored())?;
        self.engine
            .commit(vec![(Arc::clone(&self.inner), vec![(key, Some(record.stored().clone()))])])
    }

    /// Reads the committed record whose key fields match `record`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no record has that key.
    pub fn get(&self, record: &RawRecord) -> Result<RawRecord> {
        self.check_record(record)?;
        let key = self.inner.key_of(record.stored())?;
        self.inner
            .lookup(&key)
            .map(|stored| RawRecord::from_stored(Arc::clone(&self.inner), stored))
            .ok_or(Error::KeyNotFound)
    }

    /// Deletes the record whose key fields match `record`.
    ///
    /// Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine is not online.
    pub fn delete(&self, record: &RawRecord) -> Result<bool> {
        self.check_record(record)?;
        let key = self.inner.key_of(record.stored())?;
        let existed = self.inner.lookup(&key).is_some();
        self.engine.commit(vec![(Arc::clone(&self.inner), vec![(key, None)])])?;
        Ok(existed)
    }

    /// Iterates over a snapshot of the committed records in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine is not online.
    pub fn cursor(&self, order: SortOrder) -> Result<Cursor> {
        self.engine.ensure_online()?;
        Ok(Cursor {
            database: Arc::clone(&self.inner),
            records: self.inner.ordered(order).into_iter(),
        })
    }

    fn check_record(&self, record: &RawRecord) -> Result<()> {
        self.engine.ensure_online()?;
        if !Arc::ptr_eq(record.database_inner(), &self.inner) {
            return Err(Error::DatabaseMismatch {
                expected: self.inner.name.clone(),
                found: record.database().to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Iterator over a point-in-time snapshot of a database.
pub struct Cursor {
    database: Arc<DatabaseInner>,
    records: std::vec::IntoIter<StoredRecord>,
}

impl Iterator for Cursor {
    type Item = RawRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|stored| RawRecord::from_stored(Arc::clone(&self.database), stored))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::{
        backend::InMemoryBackend,
        types::{IntWidth, WireType, WireValue},
    };

    fn users() -> DatabaseInner {
        let db = DatabaseInner::new(0, "users", Box::new(InMemoryBackend::new()));
        db.add_field("name").unwrap();
        db.add_field("age").unwrap();
        db.set_field_spec("name", FieldSpec::parse("string,key(0)").unwrap()).unwrap();
        db.set_field_spec("age", FieldSpec::parse("u8").unwrap()).unwrap();
        db
    }

    fn record(name: &str, age: u64) -> StoredRecord {
        StoredRecord::from([
            ("name".to_string(), WireValue::Bytes(name.as_bytes().to_vec())),
            ("age".to_string(), WireValue::U64(age)),
        ])
    }

    #[test]
    fn test_key_of_validates_fields() {
        let db = users();
        assert!(db.key_of(&record("ann", 30)).is_ok());
        assert!(matches!(db.key_of(&record("ann", 300)), Err(Error::OutOfRange { .. })));

        let mut unknown = record("ann", 30);
        unknown.insert("email".to_string(), WireValue::Bytes(vec![]));
        assert!(matches!(db.key_of(&unknown), Err(Error::UnknownField { .. })));

        let mut keyless = record("ann", 30);
        keyless.remove("name");
        assert!(matches!(db.key_of(&keyless), Err(Error::MissingKey { .. })));
    }

    #[test]
    fn test_scheme_locks_once_records_exist() {
        let db = users();
        let key = db.key_of(&record("ann", 30)).unwrap();
        db.install(db.stage([(key, Some(record("ann", 30)))]));

        // Re-declaring the same spec is fine
        db.set_field_spec("age", FieldSpec::parse("u8").unwrap()).unwrap();
        // Changing a declared field is not
        let err = db.set_field_spec("age", FieldSpec::parse("u16").unwrap()).unwrap_err();
        assert!(matches!(err, Error::SchemeLocked { .. }));

        // New value fields may still be added, new key fields may not
        db.add_field("email").unwrap();
        db.set_field_spec("email", FieldSpec::default()).unwrap();
        db.add_field("zone").unwrap();
        let spec = FieldSpec { wire_type: WireType::uint(IntWidth::W8), key_index: Some(1) };
        assert!(matches!(db.set_field_spec("zone", spec), Err(Error::SchemeLocked { .. })));
    }

    #[test]
    fn test_snapshot_roundtrip_through_backend() {
        let db = users();
        let key = db.key_of(&record("bob", 41)).unwrap();
        db.install(db.stage([(key.clone(), Some(record("bob", 41)))]));
        db.persist(true).unwrap();

        let data = db.backend.read_snapshot().unwrap().unwrap();
        let backend = InMemoryBackend::new();
        backend.write_snapshot(&data).unwrap();
        let reloaded = DatabaseInner::new(0, "users", Box::new(backend));
        assert_eq!(reloaded.record_count(), 0);
        reloaded.load().unwrap();
        assert_eq!(reloaded.lookup(&key), Some(record("bob", 41)));
        assert_eq!(reloaded.record_count(), 1);
    }

    #[test]
    fn test_export_config() {
        let db = users();
        db.set_param("compression", "zstd");
        let mut out = BTreeMap::new();
        db.export_config(&mut out);
        assert_eq!(out.get("db.users.id").map(String::as_str), Some("0"));
        assert_eq!(out.get("db.users.scheme.name").map(String::as_str), Some("string,key(0)"));
        assert_eq!(out.get("db.users.scheme.age").map(String::as_str), Some("u8"));
        assert_eq!(out.get("db.users.compression").map(String::as_str), Some("zstd"));
    }
}
