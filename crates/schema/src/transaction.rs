//! Transactions over documents.
//!
//! Writes become visible to other readers only on [`Transaction::commit`].
//! A transaction dropped without commit rolls back.

use std::sync::Arc;

use quill_store::{DatabaseHandle, Engine};
use snafu::ResultExt;

use crate::{
    database::bind_record,
    document::Document,
    error::{EngineSnafu, Error, Result},
};

/// A write transaction spanning any databases of one environment.
pub struct Transaction {
    engine: Engine,
    inner: quill_store::Transaction,
}

impl Transaction {
    pub(crate) fn new(engine: Engine) -> Result<Self> {
        let inner = engine.transaction().context(EngineSnafu)?;
        Ok(Self { engine, inner })
    }

    fn handle(&self, document: &Document) -> Result<DatabaseHandle> {
        self.engine
            .get_object(&format!("db.{}", document.record().database()))
            .context(EngineSnafu)
    }

    /// Buffers a write of `document`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine rejects the record.
    pub fn set(&mut self, document: &Document) -> Result<()> {
        let record = bind_record(&self.handle(document)?, document);
        self.inner.set(&record).context(EngineSnafu)
    }

    /// Buffers a delete of the record with `document`'s key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the key is incomplete.
    pub fn delete(&mut self, document: &Document) -> Result<()> {
        let record = bind_record(&self.handle(document)?, document);
        self.inner.delete(&record).context(EngineSnafu)
    }

    /// Reads the record with `document`'s key, including this transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such record is visible.
    pub fn get(&self, document: &Document) -> Result<Document> {
        let handle = self.handle(document)?;
        match self.inner.get(&bind_record(&handle, document)) {
            Ok(record) => Ok(Document::from_record(Arc::clone(document.schema()), record)),
            Err(quill_store::Error::KeyNotFound) => {
                Err(Error::NotFound { database: handle.name().to_string() })
            },
            Err(source) => Err(Error::Engine { source }),
        }
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Applies all buffered writes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the commit fails; nothing is applied then.
    pub fn commit(self) -> Result<()> {
        let writes = self.inner.len();
        self.inner.commit().context(EngineSnafu)?;
        tracing::trace!(writes, "Transaction committed");
        Ok(())
    }

    /// Discards all buffered writes.
    pub fn rollback(self) {
        self.inner.rollback();
    }
}
