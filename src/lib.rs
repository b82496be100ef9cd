//! Maps Rust record types to SQLite tables.
//!
//! # Intention
//!
//! - Describe an entity once ([`Entity`], [`EntityDescriptor`]) and derive a
//!   validated [`TableSchema`] from it.
//! - Generate the CRUD statements of a schema as plain SQL text.
//! - Marshal field values into SQLite parameters and result rows back into
//!   entities, with a pluggable [`SerializerRegistry`] for types SQLite cannot
//!   store natively.
//!
//! # Architectural Boundaries
//!
//! - Schema extraction, SQL generation and marshalling are pure and never
//!   block; all I/O lives in [`sqlite`] and [`store`].
//! - Single-table CRUD by primary key only. No joins, transactions or
//!   migrations.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlite_mapper::{
//!     Database, Entity, EntityDescriptor, FieldDescriptor, Record, Result, SerializerRegistry,
//!     ValueType,
//! };
//!
//! struct Player {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl Entity for Player {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::of::<Self>()
//!             .field(FieldDescriptor::primary_key("id", ValueType::I32))
//!             .field(FieldDescriptor::column("name", ValueType::String).not_null())
//!     }
//!
//!     fn to_record(&self) -> Record {
//!         Record::new()
//!             .with_value("id", self.id)
//!             .with_value("name", self.name.as_str())
//!     }
//!
//!     fn from_record(mut record: Record) -> Result<Self> {
//!         Ok(Self {
//!             id: record.take("id")?,
//!             name: record.take("name")?,
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let db = Database::open_in_memory(Arc::new(SerializerRegistry::new()))?;
//! db.create_table::<Player>()?;
//! db.insert(&Player { id: 1, name: "Steve".into() })?;
//! assert!(db.get::<Player>(1)?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod marshal;
pub mod schema;
pub mod serializer;
pub mod sql;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod value;

pub use error::{Error, Result, SchemaError};
pub use marshal::{BoundParameter, Marshaller, RowSource};
pub use schema::{extract, Entity, EntityDescriptor, FieldDescriptor, Schema, TableSchema};
pub use serializer::{DynSerializer, JsonSerializer, Payload, Serializer, SerializerRegistry};
pub use sql::{Statement, StatementCache};
pub use sqlite::{Database, SqliteConfig, Table};
pub use store::{AsyncDatabase, AsyncTable, EntityStore};
pub use types::{ColumnConstraint, ColumnType, CustomType, ValueType};
pub use value::{CustomValue, FieldValue, FromFieldValue, Record, Value};
