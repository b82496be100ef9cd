//! Entity metadata and its validated table form.
//!
//! An entity describes itself with an [`EntityDescriptor`]: its name, an
//! optional table name and its fields in declaration order. [`extract`]
//! validates the description and produces an immutable [`TableSchema`], which
//! every SQL generator and the marshaller work from.

use std::any::type_name;
use std::collections::HashSet;

use tracing::trace;

use crate::error::{Error, Result, SchemaError};
use crate::types::{ColumnConstraint, ColumnType, ValueType};
use crate::value::Record;

/// Metadata of one entity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    value_type: ValueType,
    column_type: ColumnType,
    constraints: Vec<ColumnConstraint>,
    primary_key: bool,
    auto_increment: bool,
    persisted: bool,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            column_type: ColumnType::None,
            constraints: Vec::new(),
            primary_key: false,
            auto_increment: false,
            persisted: true,
        }
    }

    /// The field that identifies a row.
    pub fn primary_key(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, value_type)
        }
    }

    /// A persisted, non-key field.
    pub fn column(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, value_type)
    }

    /// A field that lives only in memory and never maps to a column.
    pub fn transient(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            persisted: false,
            ..Self::new(name, value_type)
        }
    }

    /// Lets SQLite assign the key. Only valid on an `i32` primary key.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn not_null(self) -> Self {
        self.with_constraint(ColumnConstraint::NotNull)
    }

    pub fn unique(self) -> Self {
        self.with_constraint(ColumnConstraint::Unique)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn constraints(&self) -> &[ColumnConstraint] {
        &self.constraints
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn is_column(&self) -> bool {
        self.persisted
    }

    /// SQL type emitted for this field in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        if self.primary_key && self.auto_increment {
            // SQLite only honours AUTOINCREMENT on `INTEGER PRIMARY KEY`.
            return "INTEGER";
        }
        self.column_type.resolve(&self.value_type)
    }
}

/// Declared shape of an entity type, fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    entity_name: String,
    table_name: Option<String>,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            table_name: None,
            fields: Vec::new(),
        }
    }

    /// Descriptor named after `T`'s simple type name.
    pub fn of<T: ?Sized>() -> Self {
        Self::new(simple_type_name::<T>())
    }

    /// Overrides the table name, used verbatim.
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Validated, immutable table metadata of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    entity_name: String,
    table_name: String,
    primary_key: FieldDescriptor,
    columns: Vec<FieldDescriptor>,
}

impl TableSchema {
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_key(&self) -> &FieldDescriptor {
        &self.primary_key
    }

    /// Non-key columns in declaration order. Positional parameters follow it.
    pub fn columns(&self) -> &[FieldDescriptor] {
        &self.columns
    }

    /// Key plus columns; also the parameter count of an insert.
    pub fn column_count(&self) -> usize {
        self.columns.len() + 1
    }

    /// Key first, then columns.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        std::iter::once(&self.primary_key).chain(self.columns.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().find(|field| field.name() == name)
    }
}

/// Validates `descriptor` and builds its [`TableSchema`].
pub fn extract(descriptor: &EntityDescriptor) -> Result<TableSchema> {
    let entity = descriptor.entity_name();

    let mut keys = descriptor.fields.iter().filter(|f| f.is_primary_key());
    let primary_key = match (keys.next(), keys.next()) {
        (None, _) => {
            return Err(SchemaError::NoPrimaryKey {
                entity: entity.to_string(),
            }
            .into())
        }
        (Some(key), None) => key.clone(),
        (Some(_), Some(_)) => {
            return Err(SchemaError::MultiplePrimaryKeys {
                entity: entity.to_string(),
                fields: descriptor
                    .fields
                    .iter()
                    .filter(|f| f.is_primary_key())
                    .map(|f| f.name.clone())
                    .collect(),
            }
            .into())
        }
    };

    let columns: Vec<FieldDescriptor> = descriptor
        .fields
        .iter()
        .filter(|f| !f.is_primary_key() && f.is_column())
        .cloned()
        .collect();
    if columns.is_empty() {
        return Err(SchemaError::NoColumns {
            entity: entity.to_string(),
        }
        .into());
    }

    if let Some(field) = descriptor
        .fields
        .iter()
        .find(|f| f.is_auto_increment() && !f.is_primary_key())
    {
        return Err(SchemaError::AutoIncrementNotKey {
            entity: entity.to_string(),
            field: field.name.clone(),
        }
        .into());
    }

    if let Some(field) = descriptor
        .fields
        .iter()
        .find(|f| f.is_auto_increment() && f.value_type != ValueType::I32)
    {
        return Err(SchemaError::InvalidAutoIncrement {
            entity: entity.to_string(),
            field: field.name.clone(),
            value_type: field.value_type,
        }
        .into());
    }

    let mut seen = HashSet::new();
    for field in std::iter::once(&primary_key).chain(columns.iter()) {
        if !field.column_type.accepts(&field.value_type) {
            return Err(Error::TypeConstraint {
                field: format!("{}.{}", entity, field.name),
                column_type: field.column_type,
                value_type: field.value_type,
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                entity: entity.to_string(),
                column: field.name.clone(),
            }
            .into());
        }
    }

    let table_name = descriptor
        .table_name
        .clone()
        .unwrap_or_else(|| entity.to_string());
    trace!(entity, table = %table_name, columns = columns.len(), "extracted table schema");

    Ok(TableSchema {
        entity_name: entity.to_string(),
        table_name,
        primary_key,
        columns,
    })
}

/// A record type that maps to one table.
///
/// `to_record` and `from_record` move field values between the struct and a
/// [`Record`]; `from_record` is the entity's constructor and should fill
/// defaults for fields it can live without.
pub trait Entity: Sized + Send + 'static {
    fn descriptor() -> EntityDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: Record) -> Result<Self>;

    fn schema() -> Result<TableSchema> {
        extract(&Self::descriptor())
    }
}

/// Tables created when a database is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    pub fn add_entity<E: Entity>(self) -> Result<Self> {
        Ok(self.add_table(E::schema()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlayerData;

    fn player() -> EntityDescriptor {
        EntityDescriptor::new("Player")
            .table("playerData")
            .field(FieldDescriptor::primary_key("id", ValueType::I32).auto_increment())
            .field(
                FieldDescriptor::column("name", ValueType::String)
                    .with_type(ColumnType::Text)
                    .not_null(),
            )
            .field(FieldDescriptor::column("age", ValueType::I32).not_null().unique())
    }

    #[test]
    fn test_extract_preserves_declaration_order() {
        let schema = extract(
            &EntityDescriptor::new("Stats")
                .field(FieldDescriptor::column("zeta", ValueType::I64))
                .field(FieldDescriptor::column("alpha", ValueType::String))
                .field(FieldDescriptor::primary_key("id", ValueType::I64))
                .field(FieldDescriptor::column("mid", ValueType::Bool)),
        )
        .unwrap();
        let names: Vec<&str> = schema.columns().iter().map(FieldDescriptor::name).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(schema.primary_key().name(), "id");
        assert_eq!(schema.column_count(), 4);
    }

    #[test]
    fn test_table_name_override_and_default() {
        assert_eq!(extract(&player()).unwrap().table_name(), "playerData");

        let schema = extract(
            &EntityDescriptor::of::<PlayerData>()
                .field(FieldDescriptor::primary_key("id", ValueType::I32))
                .field(FieldDescriptor::column("name", ValueType::String)),
        )
        .unwrap();
        assert_eq!(schema.table_name(), "PlayerData");
        assert_eq!(schema.entity_name(), "PlayerData");
    }

    #[test]
    fn test_missing_primary_key() {
        let err = extract(
            &EntityDescriptor::new("Orphan").field(FieldDescriptor::column("name", ValueType::String)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::NoPrimaryKey { .. })));
    }

    #[test]
    fn test_multiple_primary_keys() {
        let err = extract(
            &EntityDescriptor::new("Twin")
                .field(FieldDescriptor::primary_key("a", ValueType::I32))
                .field(FieldDescriptor::primary_key("b", ValueType::I32))
                .field(FieldDescriptor::column("name", ValueType::String)),
        )
        .unwrap_err();
        match err {
            Error::Schema(SchemaError::MultiplePrimaryKeys { fields, .. }) => {
                assert_eq!(fields, ["a", "b"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_columns() {
        let err = extract(
            &EntityDescriptor::new("Bare")
                .field(FieldDescriptor::primary_key("id", ValueType::I32))
                .field(FieldDescriptor::transient("cache", ValueType::String)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::NoColumns { .. })));
    }

    #[test]
    fn test_auto_increment_requires_i32_every_time() {
        let descriptor = EntityDescriptor::new("Wide")
            .field(FieldDescriptor::primary_key("id", ValueType::I64).auto_increment())
            .field(FieldDescriptor::column("name", ValueType::String));
        for _ in 0..3 {
            let err = extract(&descriptor).unwrap_err();
            assert!(matches!(
                err,
                Error::Schema(SchemaError::InvalidAutoIncrement {
                    value_type: ValueType::I64,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_auto_increment_only_on_primary_key() {
        let err = extract(
            &EntityDescriptor::new("Counter")
                .field(FieldDescriptor::primary_key("id", ValueType::String))
                .field(FieldDescriptor::column("n", ValueType::I32).auto_increment()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::AutoIncrementNotKey { ref field, .. }) if field == "n"
        ));
    }

    #[test]
    fn test_column_type_must_accept_value_type() {
        let err = extract(
            &EntityDescriptor::new("Mismatch")
                .field(FieldDescriptor::primary_key("id", ValueType::I32))
                .field(FieldDescriptor::column("score", ValueType::F64).with_type(ColumnType::Int)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::TypeConstraint {
                column_type: ColumnType::Int,
                value_type: ValueType::F64,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_type_cannot_take_explicit_column_type() {
        let err = extract(
            &EntityDescriptor::new("Holder")
                .field(FieldDescriptor::primary_key("id", ValueType::I32))
                .field(
                    FieldDescriptor::column("data", ValueType::custom::<PlayerData>())
                        .with_type(ColumnType::Blob),
                ),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeConstraint { .. }));
    }

    #[test]
    fn test_duplicate_column_names() {
        let err = extract(
            &EntityDescriptor::new("Dupe")
                .field(FieldDescriptor::primary_key("id", ValueType::I32))
                .field(FieldDescriptor::column("id", ValueType::String)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_transient_fields_are_skipped() {
        let schema = extract(
            &player().field(FieldDescriptor::transient("online", ValueType::Bool)),
        )
        .unwrap();
        assert!(schema.field("online").is_none());
        assert_eq!(schema.columns().len(), 2);
    }

    #[test]
    fn test_generic_simple_name() {
        assert_eq!(simple_type_name::<Vec<String>>(), "Vec");
        assert_eq!(simple_type_name::<PlayerData>(), "PlayerData");
    }
}
