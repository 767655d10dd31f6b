//! Raw engine records.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{db::DatabaseInner, types::WireValue};

/// Field values of a stored record, keyed by field name.
pub(crate) type StoredRecord = BTreeMap<String, WireValue>;

/// A record bound to one database.
///
/// Records carry untyped wire values; the accessors mirror the two wire
/// shapes. Setting a field never validates it: validation happens when the
/// record is written through a [`DatabaseHandle`](crate::DatabaseHandle) or
/// [`Transaction`](crate::Transaction).
#[derive(Clone)]
pub struct RawRecord {
    database: Arc<DatabaseInner>,
    fields: StoredRecord,
}

impl RawRecord {
    pub(crate) fn new(database: Arc<DatabaseInner>) -> Self {
        Self { database, fields: StoredRecord::new() }
    }

    pub(crate) fn from_stored(database: Arc<DatabaseInner>, fields: StoredRecord) -> Self {
        Self { database, fields }
    }

    pub(crate) fn database_inner(&self) -> &Arc<DatabaseInner> {
        &self.database
    }

    pub(crate) fn stored(&self) -> &StoredRecord {
        &self.fields
    }

    /// Name of the database this record belongs to.
    pub fn database(&self) -> &str {
        self.database.name()
    }

    /// Sets a field to a wire value.
    pub fn set(&mut self, field: impl Into<String>, value: WireValue) {
        self.fields.insert(field.into(), value);
    }

    /// Sets a byte-string field.
    pub fn set_string(&mut self, field: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.set(field, WireValue::Bytes(value.into()));
    }

    /// Sets an integer field.
    pub fn set_int(&mut self, field: impl Into<String>, value: u64) {
        self.set(field, WireValue::U64(value));
    }

    /// Returns the wire value of a field, if set.
    pub fn get(&self, field: &str) -> Option<&WireValue> {
        self.fields.get(field)
    }

    /// Returns a byte-string field, if set with that shape.
    pub fn get_string(&self, field: &str) -> Option<&[u8]> {
        match self.fields.get(field) {
            Some(WireValue::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Returns an integer field, if set with that shape.
    pub fn get_int(&self, field: &str) -> Option<u64> {
        match self.fields.get(field) {
            Some(WireValue::U64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if the field has a value.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<WireValue> {
        self.fields.remove(field)
    }

    /// Iterates over the set fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of set fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRecord")
            .field("database", &self.database.name())
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for RawRecord {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.database, &other.database) && self.fields == other.fields
    }
}
