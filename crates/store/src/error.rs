//! Error types for the quill storage engine.

use std::io;

use snafu::Snafu;

use crate::types::WireShape;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Snapshot file is corrupted or has an invalid layout.
    #[snafu(display("Corrupted snapshot: {reason}"))]
    Corrupted {
        /// Description of what was corrupted.
        reason: String,
    },

    /// Snapshot payload checksum verification failed.
    #[snafu(display("Snapshot checksum mismatch for database '{database}'"))]
    ChecksumMismatch {
        /// Database whose snapshot failed verification.
        database: String,
    },

    /// Invalid magic number in snapshot header.
    #[snafu(display("Invalid snapshot magic number"))]
    InvalidMagic,

    /// Unsupported snapshot format version.
    #[snafu(display("Unsupported format version: {version}"))]
    UnsupportedVersion {
        /// The unsupported version number.
        version: u16,
    },

    /// Snapshot payload could not be encoded or decoded.
    #[snafu(display("Snapshot codec error: {source}"))]
    Codec {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// A configuration key or value was rejected.
    #[snafu(display("Invalid configuration '{key}': {reason}"))]
    InvalidConfig {
        /// The offending key (or value).
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Attempt to write an engine-maintained configuration key.
    #[snafu(display("Configuration key '{key}' is read-only"))]
    ReadOnlyConfig {
        /// The read-only key.
        key: String,
    },

    /// Database has not been defined.
    #[snafu(display("Unknown database '{name}'"))]
    UnknownDatabase {
        /// The requested database name.
        name: String,
    },

    /// Field is not part of the database scheme.
    #[snafu(display("Unknown field '{field}' in database '{database}'"))]
    UnknownField {
        /// Database name.
        database: String,
        /// The unknown field.
        field: String,
    },

    /// The database scheme can no longer change in the requested way.
    #[snafu(display("Cannot change field '{field}' of database '{database}': {reason}"))]
    SchemeLocked {
        /// Database name.
        database: String,
        /// The field being changed.
        field: String,
        /// Why the change is refused.
        reason: String,
    },

    /// Value shape does not match the declared field type.
    #[snafu(display("Field '{field}' expects {expected}, found {found}"))]
    ShapeMismatch {
        /// The field being written.
        field: String,
        /// Shape declared by the scheme.
        expected: WireShape,
        /// Shape of the supplied value.
        found: WireShape,
    },

    /// Integer value does not fit the declared width.
    #[snafu(display("Value {value} out of range for field '{field}' (max {max})"))]
    OutOfRange {
        /// The field being written.
        field: String,
        /// The supplied value.
        value: u64,
        /// Largest value the field accepts.
        max: u64,
    },

    /// A key component is missing from a record.
    #[snafu(display("Key field '{field}' of database '{database}' is not set"))]
    MissingKey {
        /// Database name.
        database: String,
        /// The missing key field.
        field: String,
    },

    /// Record with the requested key does not exist.
    #[snafu(display("Key not found"))]
    KeyNotFound,

    /// Record belongs to a different database than the handle it was passed to.
    #[snafu(display("Record of database '{found}' used with database '{expected}'"))]
    DatabaseMismatch {
        /// Database of the handle.
        expected: String,
        /// Database the record was created for.
        found: String,
    },

    /// Engine is not online.
    #[snafu(display("Engine is not online (status: {status})"))]
    Offline {
        /// Current engine status.
        status: String,
    },
}

// Provide automatic conversion from io::Error to Error::Io for ergonomic ? usage
impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}
