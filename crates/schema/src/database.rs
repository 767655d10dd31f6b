//! Typed database handles.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use quill_store::{DatabaseHandle, Engine, RawRecord, SortOrder};
use snafu::ResultExt;

use crate::{
    document::Document,
    error::{EngineSnafu, Error, Result},
    field::Value,
    schema::Schema,
};

/// The engine an environment currently has open, shared with its databases.
///
/// Closing the environment empties the slot; reopening fills it with the new
/// engine, which every [`Database`] picks up on its next operation.
#[derive(Clone)]
pub(crate) struct EngineSlot {
    path: Arc<Path>,
    engine: Arc<RwLock<Option<Engine>>>,
}

impl EngineSlot {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Arc::from(path), engine: Arc::new(RwLock::new(None)) }
    }

    pub(crate) fn bind(&self, engine: Engine) {
        *self.engine.write() = Some(engine);
    }

    pub(crate) fn take(&self) -> Option<Engine> {
        self.engine.write().take()
    }

    /// Returns the bound engine, or [`Error::Closed`].
    pub(crate) fn current(&self) -> Result<Engine> {
        self.engine.read().clone().ok_or_else(|| Error::Closed { path: self.path.to_path_buf() })
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.engine.read().is_some()
    }
}

/// Copies a document's fields into a fresh record of `handle`.
///
/// Documents created before a reopen still point at the previous engine.
/// Documents of another database are passed through for the engine to reject.
pub(crate) fn bind_record(handle: &DatabaseHandle, document: &Document) -> RawRecord {
    let current = document.record();
    if current.database() != handle.name() {
        return current.clone();
    }
    let mut record = handle.document();
    for (field, value) in current.fields() {
        record.set(field, value.clone());
    }
    record
}

/// A named database read and written through a [`Schema`].
///
/// Obtained from [`Environment::database`](crate::Environment::database).
/// Operations fail with [`Error::Closed`] while the environment is closed.
#[derive(Clone)]
pub struct Database {
    name: String,
    schema: Arc<Schema>,
    slot: EngineSlot,
}

impl Database {
    pub(crate) fn new(name: &str, schema: Arc<Schema>, slot: EngineSlot) -> Self {
        Self { name: name.to_string(), schema, slot }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema documents are read through.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn handle(&self) -> Result<DatabaseHandle> {
        let engine = self.slot.current()?;
        engine.get_object(&format!("db.{}", self.name)).context(EngineSnafu)
    }

    /// Engine-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn id(&self) -> Result<u32> {
        Ok(self.handle()?.id())
    }

    /// Creates a document with key defaults filled in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn document(&self) -> Result<Document> {
        Ok(Document::new(Arc::clone(&self.schema), self.handle()?.document()))
    }

    /// Writes a document, replacing any record with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed, or
    /// [`Error::Engine`] if the engine rejects the record.
    pub fn set(&self, document: &Document) -> Result<()> {
        let handle = self.handle()?;
        handle.set(&bind_record(&handle, document)).context(EngineSnafu)
    }

    /// Reads the record whose key matches `document`'s key fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has that key.
    pub fn get(&self, document: &Document) -> Result<Document> {
        let handle = self.handle()?;
        match handle.get(&bind_record(&handle, document)) {
            Ok(record) => Ok(Document::from_record(Arc::clone(&self.schema), record)),
            Err(quill_store::Error::KeyNotFound) => {
                Err(Error::NotFound { database: self.name.clone() })
            },
            Err(source) => Err(Error::Engine { source }),
        }
    }

    /// Reads the record with the given key field values.
    ///
    /// Key fields not listed keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has that key, or a field error
    /// if a value cannot be set.
    pub fn get_by<I, S, V>(&self, key: I) -> Result<Document>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        let mut lookup = self.document()?;
        lookup.update(key)?;
        self.get(&lookup)
    }

    /// Deletes the record whose key matches `document`'s key fields.
    ///
    /// Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn delete(&self, document: &Document) -> Result<bool> {
        let handle = self.handle()?;
        handle.delete(&bind_record(&handle, document)).context(EngineSnafu)
    }

    /// Iterates over a snapshot of all documents in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed, or
    /// [`Error::Engine`] if the engine is offline.
    pub fn cursor(&self, order: SortOrder) -> Result<Documents> {
        let cursor = self.handle()?.cursor(order).context(EngineSnafu)?;
        Ok(Documents { schema: Arc::clone(&self.schema), cursor })
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn len(&self) -> Result<usize> {
        Ok(self.handle()?.len())
    }

    /// Returns true if the database holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the environment is closed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("schema", &self.schema.name())
            .field("bound", &self.slot.is_bound())
            .finish()
    }
}

/// Iterator over a database snapshot, yielding [`Document`]s.
pub struct Documents {
    schema: Arc<Schema>,
    cursor: quill_store::Cursor,
}

impl Iterator for Documents {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next().map(|record| Document::from_record(Arc::clone(&self.schema), record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use quill_store::IntWidth;

    use super::*;
    use crate::field::Field;

    fn bound_users() -> (EngineSlot, Database) {
        let schema = Schema::builder("Users")
            .field("name", Field::string().key(0))
            .field("age", Field::uint(IntWidth::W8))
            .build()
            .unwrap();
        let engine = Engine::in_memory().unwrap();
        for pair in schema.define_db("users", &Default::default()).unwrap() {
            engine.set_string(&pair.key, &pair.value).unwrap();
        }
        engine.open().unwrap();

        let slot = EngineSlot::new(PathBuf::from("/tmp/quill-test"));
        slot.bind(engine);
        let users = Database::new("users", Arc::new(schema), slot.clone());
        (slot, users)
    }

    #[test]
    fn test_set_get_delete() {
        let (_slot, users) = bound_users();
        let mut ann = users.document().unwrap();
        ann.update([("name", Value::from("Ann")), ("age", Value::UInt(30))]).unwrap();
        users.set(&ann).unwrap();

        let found = users.get_by([("name", "Ann")]).unwrap();
        assert_eq!(found.get("age").unwrap(), Value::UInt(30));
        assert!(matches!(users.get_by([("name", "Bob")]), Err(Error::NotFound { .. })));

        assert!(users.delete(&ann).unwrap());
        assert!(users.is_empty().unwrap());
    }

    #[test]
    fn test_closed_slot() {
        let (slot, users) = bound_users();
        let doc = users.document().unwrap();
        slot.take();

        assert!(matches!(users.document(), Err(Error::Closed { .. })));
        assert!(matches!(users.set(&doc), Err(Error::Closed { .. })));
        assert!(matches!(users.cursor(SortOrder::Ascending), Err(Error::Closed { .. })));
    }

    #[test]
    fn test_cursor_yields_documents() {
        let (_slot, users) = bound_users();
        for name in ["c", "a", "b"] {
            let mut doc = users.document().unwrap();
            doc.set("name", name).unwrap();
            users.set(&doc).unwrap();
        }
        let names: Vec<_> = users
            .cursor(SortOrder::Ascending)
            .unwrap()
            .map(|d| d.get("name").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
