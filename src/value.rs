use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::error::{Error, Result};
use crate::types::{CustomType, ValueType};

/// Core value types for SQLite operations
///
/// `Boolean` is only produced on the bind side; SQLite stores it as an
/// integer, so rows read back carry `Integer` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// Storage class name, used in mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
            Value::Boolean(_) => "BOOLEAN",
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
        };
        Ok(output)
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = std::str::Utf8Error;

    fn try_from(value: ValueRef<'_>) -> std::result::Result<Self, Self::Error> {
        let value = match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(std::str::from_utf8(t)?.to_string()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        };
        Ok(value)
    }
}

/// A value of a non-primitive field type. Persisted through the serializer
/// registry.
#[derive(Clone)]
pub struct CustomValue {
    type_info: CustomType,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_info: CustomType::of::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_info(&self) -> CustomType {
        self.type_info
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the value out, cloning only if other handles still share it.
    pub fn downcast<T: Any + Send + Sync + Clone>(self) -> Result<T, Self> {
        let type_info = self.type_info;
        match self.value.downcast::<T>() {
            Ok(arc) => Ok(Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone())),
            Err(value) => Err(Self { type_info, value }),
        }
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type", &self.type_info.name())
            .finish_non_exhaustive()
    }
}

/// The runtime value of a record field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Custom(CustomValue),
}

impl FieldValue {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        FieldValue::Custom(CustomValue::new(value))
    }

    /// Type of the held value, `None` for [`FieldValue::Null`].
    pub fn value_type(&self) -> Option<ValueType> {
        let value_type = match self {
            FieldValue::Null => return None,
            FieldValue::Bool(_) => ValueType::Bool,
            FieldValue::I8(_) => ValueType::I8,
            FieldValue::I16(_) => ValueType::I16,
            FieldValue::I32(_) => ValueType::I32,
            FieldValue::I64(_) => ValueType::I64,
            FieldValue::F32(_) => ValueType::F32,
            FieldValue::F64(_) => ValueType::F64,
            FieldValue::String(_) => ValueType::String,
            FieldValue::Bytes(_) => ValueType::Bytes,
            FieldValue::Date(_) => ValueType::Date,
            FieldValue::DateTime(_) => ValueType::DateTime,
            FieldValue::Custom(custom) => ValueType::Custom(custom.type_info()),
        };
        Some(value_type)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Custom(custom) => custom.type_info().name(),
            FieldValue::Bool(_) => "bool",
            FieldValue::I8(_) => "i8",
            FieldValue::I16(_) => "i16",
            FieldValue::I32(_) => "i32",
            FieldValue::I64(_) => "i64",
            FieldValue::F32(_) => "f32",
            FieldValue::F64(_) => "f64",
            FieldValue::String(_) => "String",
            FieldValue::Bytes(_) => "Vec<u8>",
            FieldValue::Date(_) => "NaiveDate",
            FieldValue::DateTime(_) => "DateTime<Utc>",
        }
    }
}

// Custom values compare by identity; their types carry no PartialEq bound.
impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::I8(a), FieldValue::I8(b)) => a == b,
            (FieldValue::I16(a), FieldValue::I16(b)) => a == b,
            (FieldValue::I32(a), FieldValue::I32(b)) => a == b,
            (FieldValue::I64(a), FieldValue::I64(b)) => a == b,
            (FieldValue::F32(a), FieldValue::F32(b)) => a == b,
            (FieldValue::F64(a), FieldValue::F64(b)) => a == b,
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Date(a), FieldValue::Date(b)) => a == b,
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a == b,
            (FieldValue::Custom(a), FieldValue::Custom(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false,
        }
    }
}

macro_rules! field_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }

            impl FromFieldValue for $ty {
                fn from_field_value(field: &str, value: FieldValue) -> Result<Self> {
                    match value {
                        FieldValue::$variant(v) => Ok(v),
                        other => Err(Error::ColumnMismatch {
                            column: field.to_string(),
                            expected: ValueType::$variant,
                            found: other.kind_name(),
                        }),
                    }
                }
            }
        )*
    };
}

field_value_conversions! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Conversion from an extracted field value back into a typed struct field.
pub trait FromFieldValue: Sized {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self>;
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field_value(field, other).map(Some),
        }
    }
}

/// Field values of one entity keyed by field name, in declaration order.
///
/// `Entity::to_record` fills one for binding; the marshaller fills one from a
/// result row and hands it to `Entity::from_record`, which plays the part of
/// the entity's constructor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing any earlier value in place.
    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Removes and converts a required field.
    pub fn take<T: FromFieldValue>(&mut self, name: &str) -> Result<T> {
        let value = self
            .remove(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?;
        T::from_field_value(name, value)
    }

    /// Removes and converts a field, falling back to `default` when the field
    /// is absent or NULL.
    pub fn take_or<T: FromFieldValue>(&mut self, name: &str, default: T) -> Result<T> {
        match self.remove(name) {
            None | Some(FieldValue::Null) => Ok(default),
            Some(value) => T::from_field_value(name, value),
        }
    }

    pub fn take_or_default<T: FromFieldValue + Default>(&mut self, name: &str) -> Result<T> {
        self.take_or(name, T::default())
    }

    /// Removes a field stored through a registered serializer.
    pub fn take_custom<T: Any + Send + Sync + Clone>(&mut self, name: &str) -> Result<T> {
        match self.remove(name) {
            Some(FieldValue::Custom(custom)) => custom.downcast::<T>().map_err(|custom| {
                Error::ColumnMismatch {
                    column: name.to_string(),
                    expected: ValueType::custom::<T>(),
                    found: custom.type_info().name(),
                }
            }),
            Some(other) => Err(Error::ColumnMismatch {
                column: name.to_string(),
                expected: ValueType::custom::<T>(),
                found: other.kind_name(),
            }),
            None => Err(Error::MissingField(name.to_string())),
        }
    }

    /// Like [`Record::take_custom`], with a default for absent or NULL fields.
    pub fn take_custom_or<T: Any + Send + Sync + Clone>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<T> {
        if matches!(self.get(name), None | Some(FieldValue::Null)) {
            self.remove(name);
            return Ok(default);
        }
        self.take_custom(name)
    }
}
