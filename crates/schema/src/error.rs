//! Error types for the schema layer.

use std::path::PathBuf;

use quill_store::WireShape;
use snafu::Snafu;

/// Errors raised while converting between application values and wire values.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// A wire value could not be decoded: wrong shape or malformed payload.
    #[snafu(display("Decode error: {reason}"))]
    Decode {
        /// What went wrong.
        reason: String,
    },

    /// A wire value had the wrong shape for the field.
    #[snafu(display("Decode error: expected {expected} wire value, found {found}"))]
    ShapeMismatch {
        /// Shape declared by the field.
        expected: WireShape,
        /// Shape actually found.
        found: WireShape,
    },

    /// The application value is of a kind the field does not accept.
    #[snafu(display("Type mismatch: {field_type} field cannot hold a {found} value"))]
    TypeMismatch {
        /// Field type name.
        field_type: String,
        /// Kind of the rejected value.
        found: &'static str,
    },

    /// The value does not fit the field's width.
    #[snafu(display("Value {value} out of range for {field_type}"))]
    ValueOutOfRange {
        /// Rendered value.
        value: String,
        /// Field type name.
        field_type: String,
    },

    /// The value is not a member of the field's enumeration.
    #[snafu(display("{value} is not a member of enum {enumeration}"))]
    InvalidEnumValue {
        /// Enumeration name.
        enumeration: String,
        /// Rendered value.
        value: String,
    },

    /// An opaque payload could not be serialized.
    #[snafu(display("Encode error: {reason}"))]
    Encode {
        /// What went wrong.
        reason: String,
    },
}

/// Errors returned by schema, document, database and environment operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A schema or database declaration is malformed.
    #[snafu(display("Invalid schema '{schema}': {reason}"))]
    Schema {
        /// Schema (or database) name.
        schema: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A field value could not be encoded or decoded.
    #[snafu(display("Field '{field}': {source}"))]
    Codec {
        /// Field name.
        field: String,
        /// Underlying codec error.
        source: CodecError,
    },

    /// The field name is not declared by the schema.
    #[snafu(display("Unknown field '{field}' in schema '{schema}'"))]
    UnknownField {
        /// Schema name.
        schema: String,
        /// Requested field.
        field: String,
    },

    /// The field is declared but has no value in the record.
    #[snafu(display("Field '{field}' is not set"))]
    FieldNotSet {
        /// Requested field.
        field: String,
    },

    /// No record matches the requested key.
    #[snafu(display("No record in '{database}' matches the given key"))]
    NotFound {
        /// Database name.
        database: String,
    },

    /// A redeclaration conflicts with the live definition of the database.
    #[snafu(display("Incompatible schema for database '{database}': {reason}"))]
    IncompatibleSchema {
        /// Database name.
        database: String,
        /// Which entry conflicts.
        reason: String,
    },

    /// The catalog and the engine disagree about a database's identity.
    #[snafu(display(
        "Catalog records id {catalog_id} for database '{database}' but the engine assigned {engine_id:?}"
    ))]
    IdentityMismatch {
        /// Database name.
        database: String,
        /// Id recorded in the catalog.
        catalog_id: u16,
        /// Id assigned by the engine, if any.
        engine_id: Option<i64>,
    },

    /// A catalog row cannot be read back as an entry.
    #[snafu(display("Corrupt catalog entry, field '{field}': {reason}"))]
    CorruptCatalog {
        /// Catalog field that could not be read.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The environment owning this handle is closed.
    #[snafu(display("Environment at {} is closed", path.display()))]
    Closed {
        /// Storage path of the environment.
        path: PathBuf,
    },

    /// A configuration value is invalid.
    #[snafu(display("Invalid configuration: {message}"))]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The storage engine reported an error.
    #[snafu(display("Engine error: {source}"))]
    Engine {
        /// Underlying engine error.
        source: quill_store::Error,
    },

    /// Filesystem error while preparing the storage location.
    #[snafu(display("I/O error at {}: {source}", path.display()))]
    Io {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result type for schema layer operations.
pub type Result<T> = std::result::Result<T, Error>;
