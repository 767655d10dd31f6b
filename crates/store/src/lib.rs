//! quill-store: a small embedded key-value engine with a flat configuration namespace.
//!
//! The engine is driven entirely through string configuration keys: databases
//! are defined by setting `db`, their fields by setting `db.<name>.scheme`,
//! and field types by setting `db.<name>.scheme.<field>`. Records are maps of
//! field name to one of two wire shapes (byte string or unsigned integer),
//! ordered by an order-preserving encoding of their key fields.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Engine API                   │
//! │  (set_string, get_object, open, close, ...) │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │       Databases / Transactions / Cursors     │
//! │   (scheme validation, composite key order)  │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │            Storage Backend                   │
//! │   (checksummed snapshots per database:      │
//! │    FileBackend / InMemoryBackend)           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Configuration is not durable: it must be re-applied after every restart.
//! Records are durable once committed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quill_store::{Engine, SortOrder};
//!
//! let engine = Engine::in_memory()?;
//! engine.set_string("db", "scores")?;
//! engine.set_string("db.scores.scheme", "score")?;
//! engine.set_string("db.scores.scheme.score", "u32_rev,key(0)")?;
//! engine.open()?;
//!
//! let scores = engine.get_object("db.scores")?;
//! let mut txn = engine.transaction()?;
//! for score in [3, 9, 4] {
//!     let mut record = scores.document();
//!     record.set_int("score", score);
//!     txn.set(&record)?;
//! }
//! txn.commit()?;
//!
//! let highest = scores.cursor(SortOrder::Ascending)?.next();
//! assert_eq!(highest.and_then(|r| r.get_int("score")), Some(9));
//! # Ok::<(), quill_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod record;
pub mod transaction;
pub mod types;

pub use backend::{FileBackend, HEADER_SIZE, InMemoryBackend, MAGIC, StorageBackend};
pub use config::{Configuration, EngineConfig};
pub use db::{Cursor, DatabaseHandle};
pub use engine::{ENGINE_VERSION, Engine, Status};
pub use error::{Error, Result};
pub use record::RawRecord;
pub use transaction::Transaction;
pub use types::{FieldSpec, IntWidth, SortOrder, WireShape, WireType, WireValue};

/// Snapshot format version.
pub const VERSION: u16 = backend::FORMAT_VERSION;
