//! Write transactions.
//!
//! A transaction buffers its writes and applies them on [`Transaction::commit`]
//! under the engine's commit lock, so other readers observe either none or
//! all of them. Reads inside the transaction see its own pending writes.
//!
//! **Drop behavior:** a `Transaction` dropped without `commit()` or
//! `rollback()` discards its writes.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    db::DatabaseInner,
    engine::EngineInner,
    error::{Error, Result},
    record::{RawRecord, StoredRecord},
};

/// Pending writes for one database: encoded key to new record (`None` deletes).
type PendingWrites = BTreeMap<Vec<u8>, Option<StoredRecord>>;

/// A write transaction spanning any number of databases of one engine.
pub struct Transaction {
    engine: Arc<EngineInner>,
    writes: BTreeMap<u32, (Arc<DatabaseInner>, PendingWrites)>,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(engine: Arc<EngineInner>) -> Self {
        Self { engine, writes: BTreeMap::new(), finished: false }
    }

    /// Buffers a write of `record`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the record does not match its scheme, or
    /// [`Error::Offline`] if the engine is not online.
    pub fn set(&mut self, record: &RawRecord) -> Result<()> {
        self.engine.ensure_online()?;
        let database = record.database_inner();
        let key = database.key_of(record.stored())?;
        self.pending(database).insert(key, Some(record.stored().clone()));
        Ok(())
    }

    /// Buffers a delete of the record whose key fields match `record`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key fields are incomplete, or
    /// [`Error::Offline`] if the engine is not online.
    pub fn delete(&mut self, record: &RawRecord) -> Result<()> {
        self.engine.ensure_online()?;
        let database = record.database_inner();
        let key = database.key_of(record.stored())?;
        self.pending(database).insert(key, None);
        Ok(())
    }

    /// Reads the record whose key fields match `record`, including writes
    /// buffered by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no such record is visible.
    pub fn get(&self, record: &RawRecord) -> Result<RawRecord> {
        self.engine.ensure_online()?;
        let database = record.database_inner();
        let key = database.key_of(record.stored())?;

        let pending = self.writes.get(&database.id()).and_then(|(_, writes)| writes.get(&key));
        let found = match pending {
            Some(write) => write.clone(),
            None => database.lookup(&key),
        };
        found
            .map(|stored| RawRecord::from_stored(Arc::clone(database), stored))
            .ok_or(Error::KeyNotFound)
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.writes.values().map(|(_, writes)| writes.len()).sum()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies and persists all buffered writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the engine went offline, or an I/O error
    /// if a snapshot cannot be written.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let batch = std::mem::take(&mut self.writes)
            .into_values()
            .map(|(database, writes)| (database, writes.into_iter().collect()))
            .collect();
        self.engine.commit(batch)
    }

    /// Discards all buffered writes.
    pub fn rollback(mut self) {
        self.finished = true;
        self.writes.clear();
    }

    fn pending(&mut self, database: &Arc<DatabaseInner>) -> &mut PendingWrites {
        &mut self
            .writes
            .entry(database.id())
            .or_insert_with(|| (Arc::clone(database), PendingWrites::new()))
            .1
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            tracing::debug!(writes = self.len(), "Transaction dropped without commit, rolling back");
        }
    }
}
