use thiserror::Error;

use crate::types::{ColumnType, ValueType};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structural problems found while turning an entity description into a
/// [`TableSchema`](crate::schema::TableSchema). Any of these is fatal for the
/// entity; no partial schema is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entity `{entity}` declares no primary key")]
    NoPrimaryKey { entity: String },

    #[error("entity `{entity}` declares more than one primary key: {}", .fields.join(", "))]
    MultiplePrimaryKeys { entity: String, fields: Vec<String> },

    #[error("entity `{entity}` declares no columns besides its primary key")]
    NoColumns { entity: String },

    #[error("field `{entity}.{field}` is auto-increment but has type {value_type}, expected i32")]
    InvalidAutoIncrement {
        entity: String,
        field: String,
        value_type: ValueType,
    },

    #[error("field `{entity}.{field}` is auto-increment but is not the primary key")]
    AutoIncrementNotKey { entity: String, field: String },

    #[error("entity `{entity}` declares column `{column}` more than once")]
    DuplicateColumn { entity: String, column: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("field `{field}` is declared as {column_type} which cannot hold {value_type}")]
    TypeConstraint {
        field: String,
        column_type: ColumnType,
        value_type: ValueType,
    },

    #[error("no serializer registered for type `{type_name}`")]
    UnsupportedType { type_name: &'static str },

    #[error("a serializer for type `{type_name}` is already registered")]
    DuplicateSerializer { type_name: &'static str },

    #[error("serializer for `{type_name}` failed")]
    Serialization {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("column `{column}` holds {found}, expected {expected}")]
    ColumnMismatch {
        column: String,
        expected: ValueType,
        found: &'static str,
    },

    #[error("column `{column}` holds text that is not valid UTF-8")]
    InvalidText {
        column: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("record has no value for field `{0}`")]
    MissingField(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::Task(error.to_string())
    }
}
