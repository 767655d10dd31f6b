//! Schema descriptors and database definitions.
//!
//! A [`Schema`] is an ordered set of named [`Field`]s. Key fields carry a key
//! position; the positions present must be exactly `0..N`. A schema is
//! validated once at construction and is immutable afterwards.
//!
//! [`Schema::define_db`] turns a schema into the ordered configuration pairs
//! that both configure the engine and are persisted in the catalog:
//!
//! ```text
//! db                  = users
//! db.users.scheme     = name
//! db.users.scheme.name = string,key(0)
//! db.users.scheme     = age
//! db.users.scheme.age = u8
//! db.users.compression = zstd
//! ```

use std::{collections::HashMap, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    field::Field,
};

/// One engine configuration assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPair {
    /// Configuration key.
    pub key: String,
    /// Configuration value.
    pub value: String,
}

impl ConfigPair {
    /// Creates a pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

impl fmt::Display for ConfigPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// Compression codecs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    None,
    /// LZ4.
    Lz4,
    /// Zstandard.
    #[default]
    Zstd,
}

impl Compression {
    /// Engine configuration value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra engine parameters for a database, kept in insertion order.
///
/// ```
/// use quill_schema::{Compression, DatabaseParams};
///
/// let params = DatabaseParams::new().compression(Compression::Lz4).cache_size(64 << 20);
/// assert_eq!(params.get("compression"), Some("lz4"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseParams {
    params: Vec<(String, String)>,
}

impl DatabaseParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter. Setting a name again replaces its value in place.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Sets the `compression` parameter.
    #[must_use]
    pub fn compression(self, codec: Compression) -> Self {
        self.param("compression", codec.as_str())
    }

    /// Sets the `cache_size` parameter, in bytes.
    #[must_use]
    pub fn cache_size(self, bytes: u64) -> Self {
        self.param("cache_size", bytes)
    }

    /// Value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Checks a schema, field, database or parameter name.
pub(crate) fn validate_name(kind: &str, name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err(format!("{kind} name is empty"));
    }
    if name.contains('.') {
        return Err(format!("{kind} name '{name}' contains '.'"));
    }
    Ok(())
}

/// An ordered, validated set of named fields.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<(String, Field)>,
    positions: HashMap<String, usize>,
    /// Positions into `fields`, in key order.
    key_order: Vec<usize>,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder { name: name.into(), fields: Vec::new() }
    }

    /// Creates a schema from `(name, field)` pairs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if names are empty, duplicated or contain a
    /// `.`, if key positions are not exactly `0..N`, or if an explicit
    /// default cannot be encoded by its field.
    pub fn define<I, S>(name: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Field)>,
        S: Into<String>,
    {
        let name = name.into();
        let fields: Vec<(String, Field)> = fields.into_iter().map(|(n, f)| (n.into(), f)).collect();
        let invalid = |reason: String| Error::Schema { schema: name.clone(), reason };

        validate_name("schema", &name).map_err(invalid)?;

        let mut positions = HashMap::with_capacity(fields.len());
        let mut keyed: Vec<(u32, usize)> = Vec::new();
        for (position, (field_name, field)) in fields.iter().enumerate() {
            validate_name("field", field_name).map_err(invalid)?;
            if positions.insert(field_name.clone(), position).is_some() {
                return Err(invalid(format!("field '{field_name}' declared twice")));
            }
            if let Err(e) = field.field_type().encode(&field.default_value()) {
                return Err(invalid(format!("default of field '{field_name}' is invalid: {e}")));
            }
            if let Some(index) = field.key_index() {
                keyed.push((index, position));
            }
        }

        keyed.sort_unstable();
        for (expected, (index, position)) in keyed.iter().enumerate() {
            if *index as usize != expected {
                let field_name = &fields[*position].0;
                return Err(invalid(if (*index as usize) < expected {
                    format!("key index {index} of field '{field_name}' is used twice")
                } else {
                    format!("key indices must be contiguous from 0, missing {expected}")
                }));
            }
        }
        let key_order = keyed.into_iter().map(|(_, position)| position).collect();

        Ok(Self { name, fields, positions, key_order })
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.positions.get(name).map(|&p| &self.fields[p].1)
    }

    /// Returns true if the field is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Key fields in key order.
    pub fn key_fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.key_order.iter().map(|&p| {
            let (n, f) = &self.fields[p];
            (n.as_str(), f)
        })
    }

    /// Value fields in declaration order.
    pub fn value_fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields().filter(|(_, f)| !f.is_key())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Produces the configuration pairs that define database `db_name`.
    ///
    /// The sequence is deterministic: it follows field declaration order and
    /// then parameter insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the database name is invalid, or if a
    /// parameter is named `id` or `scheme`, or is nested under `scheme.`.
    pub fn define_db(&self, db_name: &str, params: &DatabaseParams) -> Result<Vec<ConfigPair>> {
        let invalid = |reason: String| Error::Schema { schema: db_name.to_string(), reason };
        validate_name("database", db_name).map_err(invalid)?;

        let mut pairs = Vec::with_capacity(1 + 2 * self.fields.len() + params.len());
        pairs.push(ConfigPair::new("db", db_name));
        for (field_name, field) in &self.fields {
            pairs.push(ConfigPair::new(format!("db.{db_name}.scheme"), field_name.as_str()));
            pairs.push(ConfigPair::new(
                format!("db.{db_name}.scheme.{field_name}"),
                field.config_value(),
            ));
        }
        for (param, value) in params.iter() {
            if param.is_empty() || param == "id" || param == "scheme" || param.starts_with("scheme.")
            {
                return Err(invalid(format!("'{param}' is not a valid database parameter")));
            }
            pairs.push(ConfigPair::new(format!("db.{db_name}.{param}"), value));
        }
        Ok(pairs)
    }
}

/// Builder returned by [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Validates and builds the schema.
    ///
    /// # Errors
    ///
    /// See [`Schema::define`].
    pub fn build(self) -> Result<Schema> {
        Schema::define(self.name, self.fields)
    }
}
