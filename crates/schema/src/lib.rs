//! quill-schema: typed schemas, documents and a persistent catalog over
//! [`quill_store`].
//!
//! A [`Schema`] names typed fields and marks some of them as the composite
//! key. Declaring a schema for a database through an [`Environment`] turns it
//! into engine configuration, records that configuration in a system catalog,
//! and checks later declarations against the live definition:
//!
//! ```text
//!  Schema ──define_db──► [ConfigPair] ──compat::check──► engine configuration
//!                                              │
//!                                              ▼
//!                               catalog (<path>/_system, replayed on reopen)
//! ```
//!
//! Records are read and written as [`Document`]s, which encode each
//! [`Value`] into the engine's two wire shapes so that byte order of key
//! fields matches their declared sort order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quill_schema::{DatabaseParams, Environment, Field, IntWidth, Schema, SortOrder};
//!
//! let schema = Schema::builder("User")
//!     .field("name", Field::string().key(0))
//!     .field("age", Field::uint(IntWidth::W8))
//!     .build()?;
//!
//! let env = Environment::new("/tmp/quill")?;
//! env.open()?;
//! let users = env.database("users", schema, &DatabaseParams::new())?;
//!
//! for (name, age) in [("Ann", 30u8), ("Bob", 41)] {
//!     let mut user = users.document()?;
//!     user.set("name", name)?;
//!     user.set("age", age)?;
//!     users.set(&user)?;
//! }
//!
//! let bob = users.get_by([("name", "Bob")])?;
//! assert_eq!(bob.get("age")?.as_u64(), Some(41));
//! assert_eq!(users.cursor(SortOrder::Ascending)?.count(), 2);
//! # Ok::<(), quill_schema::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod compat;
pub mod config;
mod database;
mod document;
mod env;
pub mod error;
pub mod field;
pub mod lock;
mod schema;
mod transaction;

pub use catalog::{Catalog, CatalogEntry};
pub use compat::Compatibility;
pub use config::{CatalogConfig, EnvironmentConfig};
pub use database::{Database, Documents};
pub use document::Document;
pub use env::Environment;
pub use error::{CodecError, Error, Result};
pub use field::{EnumType, Field, FieldType, Value};
pub use lock::PathLockRegistry;
pub use quill_store::{IntWidth, SortOrder, WireShape, WireType, WireValue};
pub use schema::{Compression, ConfigPair, DatabaseParams, Schema, SchemaBuilder};
pub use transaction::Transaction;
