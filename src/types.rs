//! Column type catalog.
//!
//! [`ValueType`] is what a record field holds in Rust, [`ColumnType`] is what
//! the table column is declared as. A column type lists the value types it is
//! allowed to store; [`ColumnType::None`] defers to the field's value type.

use std::any::{type_name, TypeId};
use std::fmt;

/// Identity of a non-primitive field type, used as the serializer registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomType {
    id: TypeId,
    name: &'static str,
}

impl CustomType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The declared Rust type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    String,
    Bytes,
    Date,
    DateTime,
    Custom(CustomType),
}

impl ValueType {
    /// Shorthand for `ValueType::Custom(CustomType::of::<T>())`.
    pub fn custom<T: 'static>() -> Self {
        ValueType::Custom(CustomType::of::<T>())
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// SQL type used when a column is declared [`ColumnType::None`].
    pub fn classify(&self) -> &'static str {
        match self {
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64 => "INTEGER",
            ValueType::F32 | ValueType::F64 => "REAL",
            ValueType::Bool => "BOOLEAN",
            ValueType::String | ValueType::Date | ValueType::DateTime => "TEXT",
            ValueType::Bytes | ValueType::Custom(_) => "BLOB",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I8 => f.write_str("i8"),
            ValueType::I16 => f.write_str("i16"),
            ValueType::I32 => f.write_str("i32"),
            ValueType::I64 => f.write_str("i64"),
            ValueType::F32 => f.write_str("f32"),
            ValueType::F64 => f.write_str("f64"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::String => f.write_str("String"),
            ValueType::Bytes => f.write_str("Vec<u8>"),
            ValueType::Date => f.write_str("NaiveDate"),
            ValueType::DateTime => f.write_str("DateTime<Utc>"),
            ValueType::Custom(custom) => f.write_str(custom.name()),
        }
    }
}

const INTEGERS: &[ValueType] = &[ValueType::I8, ValueType::I16, ValueType::I32, ValueType::I64];
const SMALL_INTEGERS: &[ValueType] = &[ValueType::I8, ValueType::I16];
const SHORT_INTEGERS: &[ValueType] = &[ValueType::I8, ValueType::I16, ValueType::I32];
const FLOATS: &[ValueType] = &[ValueType::F32, ValueType::F64];
const TEXTS: &[ValueType] = &[ValueType::String];
const BYTES: &[ValueType] = &[ValueType::Bytes];
const BOOLEANS: &[ValueType] = &[ValueType::Bool];
const TEMPORALS: &[ValueType] = &[ValueType::Date, ValueType::DateTime];

/// Storage type a column may be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColumnType {
    Int,
    TinyInt,
    SmallInt,
    MediumInt,
    BigInt,
    Text,
    Clob,
    Blob,
    Real,
    Double,
    Float,
    Numeric,
    Boolean,
    Date,
    DateTime,
    /// Derive the SQL type from the field's value type.
    #[default]
    None,
}

impl ColumnType {
    /// Canonical SQL literal, `None` for [`ColumnType::None`].
    pub fn sql_name(&self) -> Option<&'static str> {
        let name = match self {
            ColumnType::Int => "INTEGER",
            ColumnType::TinyInt => "TINYINT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::MediumInt => "MEDIUMINT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Clob => "CLOB",
            ColumnType::Blob => "BLOB",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE",
            ColumnType::Float => "FLOAT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::None => return None,
        };
        Some(name)
    }

    /// Value types this column type may store. Empty for [`ColumnType::None`].
    pub fn accepted_types(&self) -> &'static [ValueType] {
        match self {
            ColumnType::Int | ColumnType::MediumInt | ColumnType::BigInt => INTEGERS,
            ColumnType::TinyInt => SMALL_INTEGERS,
            ColumnType::SmallInt => SHORT_INTEGERS,
            ColumnType::Text | ColumnType::Clob => TEXTS,
            ColumnType::Blob => BYTES,
            ColumnType::Real | ColumnType::Double | ColumnType::Float | ColumnType::Numeric => {
                FLOATS
            }
            ColumnType::Boolean => BOOLEANS,
            ColumnType::Date | ColumnType::DateTime => TEMPORALS,
            ColumnType::None => &[],
        }
    }

    /// Whether a field of `value_type` may be declared with this column type.
    pub fn accepts(&self, value_type: &ValueType) -> bool {
        *self == ColumnType::None || self.accepted_types().contains(value_type)
    }

    /// SQL type emitted for a column of this type holding `value_type`.
    pub fn resolve(&self, value_type: &ValueType) -> &'static str {
        self.sql_name().unwrap_or_else(|| value_type.classify())
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name().unwrap_or("NONE"))
    }
}

/// Constraint appended after a column's type in `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnConstraint {
    NotNull,
    Unique,
    Check(String),
    ForeignKey { table: String, column: String },
}

impl ColumnConstraint {
    pub fn check(expression: impl Into<String>) -> Self {
        ColumnConstraint::Check(expression.into())
    }

    pub fn references(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnConstraint::ForeignKey {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::NotNull => f.write_str("NOT NULL"),
            ColumnConstraint::Unique => f.write_str("UNIQUE"),
            ColumnConstraint::Check(expression) => write!(f, "CHECK ({})", expression),
            ColumnConstraint::ForeignKey { table, column } => {
                write!(f, "REFERENCES {} ({})", table, column)
            }
        }
    }
}
