use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Statement as PreparedStatement};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::marshal::{BoundParameter, Marshaller};
use crate::schema::{Entity, Schema, TableSchema};
use crate::serializer::SerializerRegistry;
use crate::sql::{Statement, StatementCache};
use crate::value::FieldValue;

const IN_MEMORY: &str = ":memory:";

fn default_foreign_keys() -> bool {
    true
}

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, `:memory:` for a private in-memory database
    pub db_path: String,
    /// How long a locked database is retried before failing
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// Enforce `REFERENCES` constraints
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// Tables created on open
    #[serde(skip)]
    pub schema: Schema,
}

impl SqliteConfig {
    /// Create a new SQLite config for the database at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: None,
            foreign_keys: default_foreign_keys(),
            schema: Schema::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Schema and cached SQL of one entity type.
pub struct Table<E> {
    schema: TableSchema,
    statements: StatementCache,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Table<E> {
    pub fn new() -> Result<Self> {
        Ok(Self::from_schema(E::schema()?))
    }
}

impl<E> Table<E> {
    pub fn from_schema(schema: TableSchema) -> Self {
        Self {
            schema,
            statements: StatementCache::new(),
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn sql(&self, statement: Statement) -> &str {
        self.statements.get(&self.schema, statement)
    }
}

/// A SQLite database holding entity tables.
///
/// Owns one connection; operations on it are serialized.
pub struct Database {
    connection: Mutex<Connection>,
    registry: Arc<SerializerRegistry>,
    tables: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Database {
    /// Opens (creating if needed) the database described by `config`.
    pub fn open(config: &SqliteConfig, registry: Arc<SerializerRegistry>) -> Result<Self> {
        debug!(path = %config.db_path, "opening sqlite database");
        let connection = if config.db_path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        if let Some(timeout) = config.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(timeout))?;
        }
        if config.foreign_keys {
            connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        }

        let database = Self {
            connection: Mutex::new(connection),
            registry,
            tables: Mutex::new(HashMap::new()),
        };
        database.initialize_schema(&config.schema)?;
        Ok(database)
    }

    pub fn open_in_memory(registry: Arc<SerializerRegistry>) -> Result<Self> {
        Self::open(&SqliteConfig::in_memory(), registry)
    }

    fn initialize_schema(&self, schema: &Schema) -> Result<()> {
        let conn = self.connection.lock();
        for table in &schema.tables {
            let sql = crate::sql::create_table_sql(table);
            debug!(table = table.table_name(), "initializing table");
            conn.execute(&sql, [])?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.registry)
    }

    /// The cached table of `E`, extracting its schema on first use.
    pub fn table<E: Entity>(&self) -> Result<Arc<Table<E>>> {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get(&TypeId::of::<E>()) {
            if let Ok(table) = Arc::clone(table).downcast::<Table<E>>() {
                return Ok(table);
            }
        }
        let table = Arc::new(Table::<E>::new()?);
        tables.insert(TypeId::of::<E>(), table.clone());
        Ok(table)
    }

    /// Runs `f` with exclusive access to the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.connection.lock();
        f(&conn)
    }

    fn execute(&self, table_name: &str, sql: &str, params: &[BoundParameter]) -> Result<usize> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        run(&mut stmt, table_name, sql, params)
    }

    pub fn create_table<E: Entity>(&self) -> Result<()> {
        let table = self.table::<E>()?;
        self.execute(table.schema().table_name(), table.sql(Statement::CreateTable), &[])?;
        Ok(())
    }

    pub fn drop_table<E: Entity>(&self) -> Result<()> {
        let table = self.table::<E>()?;
        self.execute(table.schema().table_name(), table.sql(Statement::DropTable), &[])?;
        Ok(())
    }

    /// Inserts `entity` and returns the rowid SQLite assigned.
    ///
    /// An auto-increment key bound as NULL receives the next id.
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<i64> {
        let table = self.table::<E>()?;
        let params = self
            .marshaller()
            .bind_insert(table.schema(), &entity.to_record())?;
        let conn = self.connection.lock();
        let mut stmt = conn.prepare_cached(table.sql(Statement::Insert))?;
        run(&mut stmt, table.schema().table_name(), table.sql(Statement::Insert), &params)?;
        Ok(conn.last_insert_rowid())
    }

    /// Inserts every entity through one prepared statement.
    pub fn insert_all<E: Entity>(&self, entities: &[E]) -> Result<usize> {
        let table = self.table::<E>()?;
        self.run_batch(&table, Statement::Insert, entities, |marshaller, schema, entity| {
            marshaller.bind_insert(schema, &entity.to_record())
        })
    }

    pub fn get<E: Entity>(&self, key: impl Into<FieldValue>) -> Result<Option<E>> {
        let table = self.table::<E>()?;
        let mut found = self.query(&table, Statement::Select, Some(key.into()))?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    pub fn exists<E: Entity>(&self, key: impl Into<FieldValue>) -> Result<bool> {
        let table = self.table::<E>()?;
        let params = self.marshaller().bind_key(&key.into())?;
        let sql = table.sql(Statement::Select);
        let conn = self.connection.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        bind_all(&mut stmt, &params)?;
        trace!(table = table.schema().table_name(), sql, "checking key");
        let mut rows = stmt.raw_query();
        Ok(rows.next()?.is_some())
    }

    pub fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        let table = self.table::<E>()?;
        self.query(&table, Statement::SelectAll, None)
    }

    /// Loads every row and keeps the entities matching `filter`.
    pub fn get_all_where<E: Entity>(&self, filter: impl Fn(&E) -> bool) -> Result<Vec<E>> {
        let mut entities = self.get_all::<E>()?;
        entities.retain(|entity| filter(entity));
        Ok(entities)
    }

    /// Writes every column of `entity` to the row with its key. Returns the
    /// number of rows changed.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<usize> {
        let table = self.table::<E>()?;
        let params = self
            .marshaller()
            .bind_update(table.schema(), &entity.to_record())?;
        self.execute(table.schema().table_name(), table.sql(Statement::Update), &params)
    }

    pub fn update_all<E: Entity>(&self, entities: &[E]) -> Result<usize> {
        let table = self.table::<E>()?;
        self.run_batch(&table, Statement::Update, entities, |marshaller, schema, entity| {
            marshaller.bind_update(schema, &entity.to_record())
        })
    }

    pub fn delete<E: Entity>(&self, key: impl Into<FieldValue>) -> Result<usize> {
        let table = self.table::<E>()?;
        let params = self.marshaller().bind_key(&key.into())?;
        self.execute(table.schema().table_name(), table.sql(Statement::Delete), &params)
    }

    pub fn delete_all<E: Entity>(&self) -> Result<usize> {
        let table = self.table::<E>()?;
        self.execute(table.schema().table_name(), table.sql(Statement::DeleteAll), &[])
    }

    fn run_batch<E: Entity>(
        &self,
        table: &Table<E>,
        statement: Statement,
        entities: &[E],
        bind: impl Fn(&Marshaller<'_>, &TableSchema, &E) -> Result<Vec<BoundParameter>>,
    ) -> Result<usize> {
        let marshaller = self.marshaller();
        let sql = table.sql(statement);
        let conn = self.connection.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let mut changed = 0;
        for entity in entities {
            let params = bind(&marshaller, table.schema(), entity)?;
            changed += run(&mut stmt, table.schema().table_name(), sql, &params)?;
        }
        Ok(changed)
    }

    fn query<E: Entity>(
        &self,
        table: &Table<E>,
        statement: Statement,
        key: Option<FieldValue>,
    ) -> Result<Vec<E>> {
        let marshaller = self.marshaller();
        let params = match key {
            Some(key) => marshaller.bind_key(&key)?,
            None => Vec::new(),
        };
        let sql = table.sql(statement);
        let conn = self.connection.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        bind_all(&mut stmt, &params)?;
        trace!(table = table.schema().table_name(), sql, params = params.len(), "running query");

        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(marshaller.read_entity::<E>(table.schema(), row)?);
        }
        Ok(result)
    }
}

fn bind_all(stmt: &mut PreparedStatement<'_>, params: &[BoundParameter]) -> Result<()> {
    for param in params {
        stmt.raw_bind_parameter(param.index, &param.value)?;
    }
    Ok(())
}

fn run(
    stmt: &mut PreparedStatement<'_>,
    table_name: &str,
    sql: &str,
    params: &[BoundParameter],
) -> Result<usize> {
    bind_all(stmt, params)?;
    trace!(table = table_name, sql, params = params.len(), "executing statement");
    Ok(stmt.raw_execute()?)
}
