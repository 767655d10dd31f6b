//! Typed views over raw engine records.

use std::{fmt, sync::Arc};

use quill_store::RawRecord;
use snafu::ResultExt;

use crate::{
    error::{CodecSnafu, Error, Result},
    field::{Field, Value},
    schema::Schema,
};

/// A record of one database, read and written through its [`Schema`].
///
/// Key fields hold their default value from construction, so a document
/// always carries a complete key.
#[derive(Clone)]
pub struct Document {
    schema: Arc<Schema>,
    record: RawRecord,
}

impl Document {
    /// Wraps a fresh record and fills in key defaults.
    pub(crate) fn new(schema: Arc<Schema>, mut record: RawRecord) -> Self {
        for (name, field) in schema.key_fields() {
            // Defaults are checked when the schema is built
            if let Ok(wire) = field.field_type().encode(&field.default_value()) {
                record.set(name, wire);
            }
        }
        Self { schema, record }
    }

    /// Wraps a record read from the engine.
    pub(crate) fn from_record(schema: Arc<Schema>, record: RawRecord) -> Self {
        Self { schema, record }
    }

    pub(crate) fn record(&self) -> &RawRecord {
        &self.record
    }

    /// Schema this document is read through.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn resolve(&self, field: &str) -> Result<&Field> {
        self.schema.field(field).ok_or_else(|| Error::UnknownField {
            schema: self.schema.name().to_string(),
            field: field.to_string(),
        })
    }

    /// Reads and decodes a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the schema does not declare `field`,
    /// [`Error::FieldNotSet`] if the record has no value for it, or
    /// [`Error::Codec`] if the stored value cannot be decoded.
    pub fn get(&self, field: &str) -> Result<Value> {
        let descriptor = self.resolve(field)?;
        let wire = self
            .record
            .get(field)
            .ok_or_else(|| Error::FieldNotSet { field: field.to_string() })?;
        descriptor.field_type().decode(wire).context(CodecSnafu { field })
    }

    /// Encodes and writes a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the schema does not declare `field`,
    /// or [`Error::Codec`] if the value cannot be encoded.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let wire = self.resolve(field)?.field_type().encode(&value.into()).context(CodecSnafu { field })?;
        self.record.set(field, wire);
        Ok(())
    }

    /// Writes several fields, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn update<I, S, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        for (field, value) in values {
            self.set(field.as_ref(), value)?;
        }
        Ok(())
    }

    /// Returns true if `field` is declared and has a value in the record.
    pub fn contains(&self, field: &str) -> bool {
        self.schema.contains(field) && self.record.contains(field)
    }

    /// Set fields with their decoded values, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(&str, Value)>> + '_ {
        self.schema.fields().filter_map(move |(name, field)| {
            let wire = self.record.get(name)?;
            Some(field.field_type().decode(wire).context(CodecSnafu { field: name }).map(|v| (name, v)))
        })
    }

    /// Collects [`iter`](Self::iter).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a stored value cannot be decoded.
    pub fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.iter().map(|entry| entry.map(|(name, value)| (name.to_string(), value))).collect()
    }

    /// Decoded key fields in key order.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn key(&self) -> Result<Vec<Value>> {
        self.schema.key_fields().map(|(name, _)| self.get(name)).collect()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.record == other.record
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.iter() {
            match entry {
                Ok((name, value)) => map.entry(&name, &value),
                Err(e) => map.entry(&"<error>", &e.to_string()),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use quill_store::{Engine, IntWidth, WireValue};

    use super::*;
    use crate::{error::CodecError, field::EnumType};

    fn setup(schema: &Schema) -> (Engine, Arc<Schema>) {
        let engine = Engine::in_memory().unwrap();
        for pair in schema.define_db("t", &Default::default()).unwrap() {
            engine.set_string(&pair.key, &pair.value).unwrap();
        }
        (engine, Arc::new(schema.clone()))
    }

    fn document(engine: &Engine, schema: &Arc<Schema>) -> Document {
        let handle = engine.get_object("db.t").unwrap();
        Document::new(Arc::clone(schema), handle.document())
    }

    fn people() -> Schema {
        Schema::builder("People")
            .field("name", Field::string().key(0).with_default("nobody"))
            .field("rank", Field::int_rev(IntWidth::W16).key(1))
            .field("email", Field::string())
            .field("age", Field::uint(IntWidth::W8))
            .build()
            .unwrap()
    }

    #[test]
    fn test_key_defaults_are_present_immediately() {
        let (engine, schema) = setup(&people());
        let doc = document(&engine, &schema);

        assert_eq!(doc.get("name").unwrap(), Value::String("nobody".to_string()));
        assert_eq!(doc.get("rank").unwrap(), Value::Int(0));
        assert!(!doc.contains("email"));
        assert_eq!(doc.key().unwrap(), vec![Value::from("nobody"), Value::Int(0)]);
    }

    #[test]
    fn test_get_and_set() {
        let (engine, schema) = setup(&people());
        let mut doc = document(&engine, &schema);

        doc.set("email", "ann@example.com").unwrap();
        doc.set("age", 30u8).unwrap();
        assert_eq!(doc.get("age").unwrap(), Value::UInt(30));
        assert!(doc.contains("email"));

        assert!(matches!(doc.get("phone"), Err(Error::UnknownField { .. })));
        assert!(matches!(doc.set("phone", "1"), Err(Error::UnknownField { .. })));
        assert!(!doc.contains("phone"));

        let err = doc.set("age", 1000u64).unwrap_err();
        assert!(matches!(err, Error::Codec { source: CodecError::ValueOutOfRange { .. }, .. }));
        let err = doc.set("age", "thirty").unwrap_err();
        assert!(matches!(err, Error::Codec { source: CodecError::TypeMismatch { .. }, .. }));
    }

    #[test]
    fn test_unset_value_field() {
        let (engine, schema) = setup(&people());
        let doc = document(&engine, &schema);
        assert!(matches!(doc.get("email"), Err(Error::FieldNotSet { .. })));
    }

    #[test]
    fn test_update_stops_at_first_failure() {
        let (engine, schema) = setup(&people());
        let mut doc = document(&engine, &schema);

        let result = doc.update([
            ("name", Value::from("bob")),
            ("age", Value::from(500u64)),
            ("email", Value::from("bob@example.com")),
        ]);
        assert!(result.is_err());
        assert_eq!(doc.get("name").unwrap(), Value::from("bob"));
        assert!(!doc.contains("email"));
    }

    #[test]
    fn test_iteration_follows_declaration_order_and_skips_unset() {
        let (engine, schema) = setup(&people());
        let mut doc = document(&engine, &schema);
        doc.update([("age", Value::UInt(41)), ("name", Value::from("cy"))]).unwrap();

        let entries = doc.entries().unwrap();
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "rank", "age"]);
        assert_eq!(entries[2].1, Value::UInt(41));
    }

    #[test]
    fn test_decode_error_on_wrong_shape() {
        let (engine, schema) = setup(&people());
        let mut record = engine.get_object("db.t").unwrap().document();
        record.set("age", WireValue::Bytes(b"x".to_vec()));
        let doc = Document::from_record(schema, record);

        let err = doc.get("age").unwrap_err();
        assert!(matches!(err, Error::Codec { source: CodecError::ShapeMismatch { .. }, .. }));
        assert!(doc.entries().is_err());
    }

    #[test]
    fn test_enum_field() {
        let status = EnumType::new("Status", [("active", 1), ("banned", -1)]).unwrap();
        let schema = Schema::define("S", [("id", Field::uuid().key(0)), ("status", Field::enumeration(status))])
            .unwrap();
        let (engine, schema) = setup(&schema);
        let mut doc = document(&engine, &schema);

        assert_eq!(doc.get("id").unwrap(), Value::Uuid(uuid::Uuid::nil()));
        doc.set("status", Value::Enum("banned".to_string())).unwrap();
        assert_eq!(doc.get("status").unwrap().as_str(), Some("banned"));
        let err = doc.set("status", Value::Enum("ghost".to_string())).unwrap_err();
        assert!(matches!(err, Error::Codec { source: CodecError::InvalidEnumValue { .. }, .. }));
    }
}
