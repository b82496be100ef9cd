//! Conversion between field values and SQLite parameters / result columns.
//!
//! Strings, integers, floats, booleans, byte vectors and chrono dates bind
//! natively. Every other type goes through the [`SerializerRegistry`]; a type
//! with no registered serializer is an [`Error::UnsupportedType`], never a
//! NULL parameter.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::schema::{Entity, FieldDescriptor, TableSchema};
use crate::serializer::{Payload, SerializerRegistry};
use crate::types::ValueType;
use crate::value::{FieldValue, Record, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A value bound to a 1-based positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub index: usize,
    pub value: Value,
}

/// Read access to one result row by column name.
pub trait RowSource {
    fn column(&self, name: &str) -> Result<Value>;
}

impl RowSource for rusqlite::Row<'_> {
    fn column(&self, name: &str) -> Result<Value> {
        Value::try_from(self.get_ref(name)?).map_err(|source| Error::InvalidText {
            column: name.to_string(),
            source,
        })
    }
}

impl RowSource for HashMap<String, Value> {
    fn column(&self, name: &str) -> Result<Value> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Marshaller<'a> {
    registry: &'a SerializerRegistry,
}

impl<'a> Marshaller<'a> {
    pub fn new(registry: &'a SerializerRegistry) -> Self {
        Self { registry }
    }

    pub fn bind(&self, index: usize, value: &FieldValue) -> Result<BoundParameter> {
        Ok(BoundParameter {
            index,
            value: self.to_sql_value(value)?,
        })
    }

    pub fn to_sql_value(&self, value: &FieldValue) -> Result<Value> {
        let value = match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Boolean(*b),
            FieldValue::I8(i) => Value::Integer(i64::from(*i)),
            FieldValue::I16(i) => Value::Integer(i64::from(*i)),
            FieldValue::I32(i) => Value::Integer(i64::from(*i)),
            FieldValue::I64(i) => Value::Integer(*i),
            FieldValue::F32(f) => Value::Real(f64::from(*f)),
            FieldValue::F64(f) => Value::Real(*f),
            FieldValue::String(s) => Value::Text(s.clone()),
            FieldValue::Bytes(b) => Value::Blob(b.clone()),
            FieldValue::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
            FieldValue::DateTime(dt) => Value::Text(dt.to_rfc3339()),
            FieldValue::Custom(custom) => self.registry.serialize(custom)?.into(),
        };
        Ok(value)
    }

    /// Parameters of a select or delete by key.
    pub fn bind_key(&self, key: &FieldValue) -> Result<Vec<BoundParameter>> {
        Ok(vec![self.bind(1, key)?])
    }

    /// Parameters of an insert: key first, then columns.
    pub fn bind_insert(&self, schema: &TableSchema, record: &Record) -> Result<Vec<BoundParameter>> {
        self.bind_fields(schema.fields(), record)
    }

    /// Parameters of an update: columns first, then the key.
    pub fn bind_update(&self, schema: &TableSchema, record: &Record) -> Result<Vec<BoundParameter>> {
        self.bind_fields(
            schema
                .columns()
                .iter()
                .chain(std::iter::once(schema.primary_key())),
            record,
        )
    }

    fn bind_fields<'f>(
        &self,
        fields: impl Iterator<Item = &'f FieldDescriptor>,
        record: &Record,
    ) -> Result<Vec<BoundParameter>> {
        fields
            .enumerate()
            .map(|(position, field)| {
                let value = record
                    .get(field.name())
                    .ok_or_else(|| Error::MissingField(field.name().to_string()))?;
                match value.value_type() {
                    Some(found) if found != field.value_type() => Err(Error::ColumnMismatch {
                        column: field.name().to_string(),
                        expected: field.value_type(),
                        found: value.kind_name(),
                    }),
                    _ => self.bind(position + 1, value),
                }
            })
            .collect()
    }

    /// Reads `field`'s column from `row` as the field's declared type.
    pub fn extract(&self, field: &FieldDescriptor, row: &impl RowSource) -> Result<FieldValue> {
        let value = row.column(field.name())?;
        self.from_sql_value(field.name(), field.value_type(), value)
    }

    pub fn from_sql_value(
        &self,
        column: &str,
        value_type: ValueType,
        value: Value,
    ) -> Result<FieldValue> {
        let mismatch = |value: &Value| Error::ColumnMismatch {
            column: column.to_string(),
            expected: value_type,
            found: value.kind_name(),
        };

        let field = match (value_type, value) {
            (_, Value::Null) => FieldValue::Null,
            (ValueType::I8, Value::Integer(i)) => {
                FieldValue::I8(i8::try_from(i).map_err(|_| mismatch(&Value::Integer(i)))?)
            }
            (ValueType::I16, Value::Integer(i)) => {
                FieldValue::I16(i16::try_from(i).map_err(|_| mismatch(&Value::Integer(i)))?)
            }
            (ValueType::I32, Value::Integer(i)) => {
                FieldValue::I32(i32::try_from(i).map_err(|_| mismatch(&Value::Integer(i)))?)
            }
            (ValueType::I64, Value::Integer(i)) => FieldValue::I64(i),
            (ValueType::F32, Value::Real(r)) => FieldValue::F32(r as f32),
            (ValueType::F32, Value::Integer(i)) => FieldValue::F32(i as f32),
            (ValueType::F64, Value::Real(r)) => FieldValue::F64(r),
            (ValueType::F64, Value::Integer(i)) => FieldValue::F64(i as f64),
            (ValueType::Bool, Value::Boolean(b)) => FieldValue::Bool(b),
            (ValueType::Bool, Value::Integer(i)) => FieldValue::Bool(i != 0),
            (ValueType::String, Value::Text(s)) => FieldValue::String(s),
            (ValueType::Bytes, Value::Blob(b)) => FieldValue::Bytes(b),
            (ValueType::Date, Value::Text(s)) => match NaiveDate::parse_from_str(&s, DATE_FORMAT) {
                Ok(date) => FieldValue::Date(date),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },
            (ValueType::DateTime, Value::Text(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => FieldValue::DateTime(dt.with_timezone(&Utc)),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },
            (ValueType::Custom(custom), Value::Text(s)) => {
                self.registry.deserialize(&custom, Payload::Text(s))?
            }
            (ValueType::Custom(custom), Value::Blob(b)) => {
                self.registry.deserialize(&custom, Payload::Bytes(b))?
            }
            (_, other) => return Err(mismatch(&other)),
        };
        Ok(field)
    }

    /// Extracts every column of `schema` from `row`.
    pub fn read_record(&self, schema: &TableSchema, row: &impl RowSource) -> Result<Record> {
        let mut record = Record::new();
        for field in schema.fields() {
            record.insert(field.name(), self.extract(field, row)?);
        }
        Ok(record)
    }

    pub fn read_entity<E: Entity>(&self, schema: &TableSchema, row: &impl RowSource) -> Result<E> {
        E::from_record(self.read_record(schema, row)?)
    }
}
