//! SQL text generation.
//!
//! Every generator is a pure function of a [`TableSchema`]. Positional
//! parameters follow fixed rules per statement:
//!
//! - insert binds the key first, then the columns in declaration order;
//! - update binds the columns in declaration order, then the key;
//! - select and delete bind only the key.

use once_cell::sync::OnceCell;

use crate::schema::{FieldDescriptor, TableSchema};

/// `CREATE TABLE IF NOT EXISTS <table> (<key> <type> PRIMARY KEY [AUTOINCREMENT], <col> <type> [constraint...], ...);`
pub fn create_table_sql(schema: &TableSchema) -> String {
    let key = schema.primary_key();
    let mut definitions = Vec::with_capacity(schema.column_count());

    let mut key_definition = format!("{} {} PRIMARY KEY", key.name(), key.sql_type());
    if key.is_auto_increment() {
        key_definition.push_str(" AUTOINCREMENT");
    }
    push_constraints(&mut key_definition, key);
    definitions.push(key_definition);

    for column in schema.columns() {
        let mut definition = format!("{} {}", column.name(), column.sql_type());
        push_constraints(&mut definition, column);
        definitions.push(definition);
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        schema.table_name(),
        definitions.join(", ")
    )
}

fn push_constraints(definition: &mut String, field: &FieldDescriptor) {
    for constraint in field.constraints() {
        definition.push(' ');
        definition.push_str(&constraint.to_string());
    }
}

/// `SELECT * FROM <table> WHERE <key> = ?;`
pub fn select_sql(schema: &TableSchema) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = ?;",
        schema.table_name(),
        schema.primary_key().name()
    )
}

/// `SELECT * FROM <table>;`
pub fn select_all_sql(schema: &TableSchema) -> String {
    format!("SELECT * FROM {};", schema.table_name())
}

/// `INSERT INTO <table> (<key>, <col>, ...) VALUES (?, ?, ...);`
pub fn insert_sql(schema: &TableSchema) -> String {
    let names: Vec<&str> = schema.fields().map(FieldDescriptor::name).collect();
    let placeholders = vec!["?"; names.len()];
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        schema.table_name(),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// `UPDATE <table> SET <col> = ?, ... WHERE <key> = ?;`
pub fn update_sql(schema: &TableSchema) -> String {
    let assignments: Vec<String> = schema
        .columns()
        .iter()
        .map(|column| format!("{} = ?", column.name()))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?;",
        schema.table_name(),
        assignments.join(", "),
        schema.primary_key().name()
    )
}

/// `DELETE FROM <table> WHERE <key> = ?;`
pub fn delete_sql(schema: &TableSchema) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?;",
        schema.table_name(),
        schema.primary_key().name()
    )
}

/// `DELETE FROM <table>;`
pub fn delete_all_sql(schema: &TableSchema) -> String {
    format!("DELETE FROM {};", schema.table_name())
}

/// `DROP TABLE IF EXISTS <table>;`
pub fn drop_table_sql(schema: &TableSchema) -> String {
    format!("DROP TABLE IF EXISTS {};", schema.table_name())
}

/// Statement kinds, one per generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    CreateTable,
    Select,
    SelectAll,
    Insert,
    Update,
    Delete,
    DeleteAll,
    DropTable,
}

impl Statement {
    pub const ALL: [Statement; 8] = [
        Statement::CreateTable,
        Statement::Select,
        Statement::SelectAll,
        Statement::Insert,
        Statement::Update,
        Statement::Delete,
        Statement::DeleteAll,
        Statement::DropTable,
    ];

    pub fn generate(self, schema: &TableSchema) -> String {
        match self {
            Statement::CreateTable => create_table_sql(schema),
            Statement::Select => select_sql(schema),
            Statement::SelectAll => select_all_sql(schema),
            Statement::Insert => insert_sql(schema),
            Statement::Update => update_sql(schema),
            Statement::Delete => delete_sql(schema),
            Statement::DeleteAll => delete_all_sql(schema),
            Statement::DropTable => drop_table_sql(schema),
        }
    }

    /// Number of positional parameters the statement expects.
    pub fn parameter_count(self, schema: &TableSchema) -> usize {
        match self {
            Statement::Insert | Statement::Update => schema.column_count(),
            Statement::Select | Statement::Delete => 1,
            Statement::CreateTable
            | Statement::SelectAll
            | Statement::DeleteAll
            | Statement::DropTable => 0,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Lazily generated SQL for one schema; each statement is built at most once.
#[derive(Debug, Default)]
pub struct StatementCache {
    slots: [OnceCell<String>; 8],
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, schema: &TableSchema, statement: Statement) -> &str {
        self.slots[statement.slot()].get_or_init(|| statement.generate(schema))
    }

    pub fn is_generated(&self, statement: Statement) -> bool {
        self.slots[statement.slot()].get().is_some()
    }
}
