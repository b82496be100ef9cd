use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, Result};
use serde::{Deserialize, Serialize};
use sqlite_mapper::{
    sql, ColumnType, Database, Entity, EntityDescriptor, Error, FieldDescriptor, FieldValue,
    JsonSerializer, Marshaller, Record, SerializerRegistry, SqliteConfig, Statement, Value,
    ValueType,
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Home {
    world: String,
    x: i32,
    y: i32,
    z: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Player {
    id: Option<i32>,
    name: String,
    age: i32,
    score: f64,
    admin: bool,
    joined: NaiveDate,
    home: Home,
    // Not persisted.
    online: bool,
}

impl Entity for Player {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::of::<Self>()
            .table("playerData")
            .field(FieldDescriptor::primary_key("id", ValueType::I32).auto_increment())
            .field(
                FieldDescriptor::column("name", ValueType::String)
                    .with_type(ColumnType::Text)
                    .not_null(),
            )
            .field(FieldDescriptor::column("age", ValueType::I32).not_null())
            .field(FieldDescriptor::column("score", ValueType::F64))
            .field(FieldDescriptor::column("admin", ValueType::Bool))
            .field(FieldDescriptor::column("joined", ValueType::Date).with_type(ColumnType::Date))
            .field(FieldDescriptor::column("home", ValueType::custom::<Home>()))
            .field(FieldDescriptor::transient("online", ValueType::Bool))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_value("id", self.id)
            .with_value("name", self.name.as_str())
            .with_value("age", self.age)
            .with_value("score", self.score)
            .with_value("admin", self.admin)
            .with_value("joined", self.joined)
            .with_value("home", FieldValue::custom(self.home.clone()))
    }

    fn from_record(mut record: Record) -> sqlite_mapper::Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            name: record.take("name")?,
            age: record.take("age")?,
            score: record.take_or("score", 0.0)?,
            admin: record.take_or_default("admin")?,
            joined: record.take("joined")?,
            home: record.take_custom("home")?,
            online: false,
        })
    }
}

fn player(name: &str, age: i32) -> Player {
    Player {
        id: None,
        name: name.to_string(),
        age,
        score: 12.5,
        admin: false,
        joined: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
        home: Home {
            world: "overworld".into(),
            x: 10,
            y: 64,
            z: -3,
        },
        online: true,
    }
}

fn registry() -> Arc<SerializerRegistry> {
    let mut registry = SerializerRegistry::new();
    registry.register(JsonSerializer::<Home>::new()).unwrap();
    Arc::new(registry)
}

// Helper function to create an in-memory database for testing
fn create_test_db() -> sqlite_mapper::Result<Database> {
    let db = Database::open_in_memory(registry())?;
    db.create_table::<Player>()?;
    Ok(db)
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> sqlite_mapper::Result<(Database, NamedTempFile)> {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap();
    let db = Database::open(&SqliteConfig::new(path), registry())?;
    db.create_table::<Player>()?;
    Ok((db, temp_file))
}

#[test]
fn test_generated_sql_runs_on_plain_connection() -> Result<()> {
    let schema = Player::schema().unwrap();
    let conn = Connection::open_in_memory()?;
    conn.execute(&sql::create_table_sql(&schema), [])?;

    let registry = registry();
    let marshaller = Marshaller::new(&registry);
    let record = player("Alex", 30).to_record();
    let params = marshaller.bind_insert(&schema, &record).unwrap();
    assert_eq!(params.len(), Statement::Insert.parameter_count(&schema));

    let mut stmt = conn.prepare(&sql::insert_sql(&schema))?;
    for param in &params {
        stmt.raw_bind_parameter(param.index, &param.value)?;
    }
    stmt.raw_execute()?;

    let (name, home): (String, String) = conn.query_row(
        "SELECT name, home FROM playerData WHERE id = ?",
        [1],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    assert_eq!(name, "Alex");
    assert_eq!(home, r#"{"world":"overworld","x":10,"y":64,"z":-3}"#);
    Ok(())
}

#[test]
fn test_basic_operations() -> anyhow::Result<()> {
    let db = create_test_db()?;

    let id = db.insert(&player("John Doe", 30))?;
    assert_eq!(id, 1);

    let stored = db.get::<Player>(1)?.expect("player was inserted");
    assert_eq!(stored.id, Some(1));
    assert_eq!(stored.name, "John Doe");
    assert_eq!(stored.home, player("x", 0).home);
    assert!(!stored.online);

    let older = Player {
        age: 31,
        admin: true,
        ..stored.clone()
    };
    assert_eq!(db.update(&older)?, 1);
    assert_eq!(db.get::<Player>(1)?, Some(older));

    assert_eq!(db.delete::<Player>(1)?, 1);
    assert!(db.get::<Player>(1)?.is_none());
    assert!(!db.exists::<Player>(1)?);
    Ok(())
}

#[test]
fn test_batch_operations() -> anyhow::Result<()> {
    let db = create_test_db()?;
    let inserted = db.insert_all(&[player("a", 20), player("b", 25), player("c", 40)])?;
    assert_eq!(inserted, 3);

    let mut all = db.get_all::<Player>()?;
    assert_eq!(all.len(), 3);
    let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    for p in &mut all {
        p.score = 99.0;
    }
    assert_eq!(db.update_all(&all)?, 3);

    let adults = db.get_all_where::<Player>(|p| p.age >= 25)?;
    assert_eq!(adults.len(), 2);
    assert!(adults.iter().all(|p| p.score == 99.0));

    assert_eq!(db.delete_all::<Player>()?, 3);
    assert!(db.get_all::<Player>()?.is_empty());
    Ok(())
}

#[test]
fn test_not_null_is_enforced() -> anyhow::Result<()> {
    let db = create_test_db()?;
    db.with_connection(|conn| {
        conn.execute(
            "INSERT INTO playerData (id, name, age) VALUES (?1, ?2, ?3)",
            rusqlite::params![1, "Nobody", rusqlite::types::Null],
        )?;
        Ok(())
    })
    .expect_err("age is NOT NULL");
    Ok(())
}

#[test]
fn test_default_filled_for_null_columns() -> anyhow::Result<()> {
    let db = create_test_db()?;
    let home = serde_json::to_string(&player("x", 0).home)?;
    db.with_connection(|conn| {
        conn.execute(
            "INSERT INTO playerData (id, name, age, joined, home) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![7, "Partial", 18, "2023-12-01", home],
        )?;
        Ok(())
    })?;

    let stored = db.get::<Player>(7)?.expect("row exists");
    assert_eq!(stored.score, 0.0);
    assert!(!stored.admin);
    Ok(())
}

#[test]
fn test_drop_table() -> anyhow::Result<()> {
    let db = create_test_db()?;
    db.insert(&player("gone", 1))?;
    db.drop_table::<Player>()?;
    let err = db.get_all::<Player>().unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));

    db.create_table::<Player>()?;
    assert!(db.get_all::<Player>()?.is_empty());
    Ok(())
}

#[test]
fn test_file_database_persists() -> anyhow::Result<()> {
    let (db, temp_file) = create_temp_db()?;
    db.insert(&player("Persisted", 50))?;
    drop(db);

    let reopened = Database::open(
        &SqliteConfig::new(temp_file.path().to_str().unwrap()),
        registry(),
    )?;
    let stored = reopened.get::<Player>(1)?.expect("row survives reopen");
    assert_eq!(stored.name, "Persisted");
    Ok(())
}

#[test]
fn test_missing_serializer_fails_insert() -> anyhow::Result<()> {
    let db = Database::open_in_memory(Arc::new(SerializerRegistry::new()))?;
    db.create_table::<Player>()?;
    let err = db.insert(&player("NoHome", 3)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { .. }));
    assert!(db.get_all::<Player>()?.is_empty());
    Ok(())
}

#[test]
fn test_datetime_column_round_trip() -> anyhow::Result<()> {
    let registry = SerializerRegistry::new();
    let marshaller = Marshaller::new(&registry);
    let when = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let bound = marshaller.bind(1, &FieldValue::DateTime(when))?;
    assert_eq!(bound.value, Value::Text("2025-01-02T03:04:05+00:00".into()));

    let row = HashMap::from([("seen".to_string(), bound.value)]);
    let field = FieldDescriptor::column("seen", ValueType::DateTime);
    assert_eq!(marshaller.extract(&field, &row)?, FieldValue::DateTime(when));
    Ok(())
}
