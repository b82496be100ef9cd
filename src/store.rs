//! Async access to a [`Database`].
//!
//! SQLite calls block, so each operation is moved onto tokio's blocking pool.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::Entity;
use crate::sqlite::Database;
use crate::value::FieldValue;

/// Async CRUD over the table of one entity type.
#[async_trait]
pub trait EntityStore: Send + Sync {
    type Entity: Entity;

    async fn create_table(&self) -> Result<()>;
    async fn insert(&self, entity: Self::Entity) -> Result<i64>;
    async fn get(&self, key: FieldValue) -> Result<Option<Self::Entity>>;
    async fn exists(&self, key: FieldValue) -> Result<bool>;
    async fn get_all(&self) -> Result<Vec<Self::Entity>>;
    async fn update(&self, entity: Self::Entity) -> Result<usize>;
    async fn delete(&self, key: FieldValue) -> Result<usize>;
    async fn delete_all(&self) -> Result<usize>;
    async fn drop_table(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AsyncDatabase {
    inner: Arc<Database>,
}

impl AsyncDatabase {
    pub fn new(database: Database) -> Self {
        Self {
            inner: Arc::new(database),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.inner
    }

    /// Store for the table of `E`.
    pub fn entity<E: Entity>(&self) -> AsyncTable<E> {
        AsyncTable {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }

    /// Runs `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        run_blocking(self.inner.clone(), f).await
    }
}

async fn run_blocking<T, F>(database: Arc<Database>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&database)).await?
}

pub struct AsyncTable<E> {
    inner: Arc<Database>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for AsyncTable<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity> EntityStore for AsyncTable<E> {
    type Entity = E;

    async fn create_table(&self) -> Result<()> {
        run_blocking(self.inner.clone(), |db| db.create_table::<E>()).await
    }

    async fn insert(&self, entity: E) -> Result<i64> {
        run_blocking(self.inner.clone(), move |db| db.insert(&entity)).await
    }

    async fn get(&self, key: FieldValue) -> Result<Option<E>> {
        run_blocking(self.inner.clone(), move |db| db.get::<E>(key)).await
    }

    async fn exists(&self, key: FieldValue) -> Result<bool> {
        run_blocking(self.inner.clone(), move |db| db.exists::<E>(key)).await
    }

    async fn get_all(&self) -> Result<Vec<E>> {
        run_blocking(self.inner.clone(), |db| db.get_all::<E>()).await
    }

    async fn update(&self, entity: E) -> Result<usize> {
        run_blocking(self.inner.clone(), move |db| db.update(&entity)).await
    }

    async fn delete(&self, key: FieldValue) -> Result<usize> {
        run_blocking(self.inner.clone(), move |db| db.delete::<E>(key)).await
    }

    async fn delete_all(&self) -> Result<usize> {
        run_blocking(self.inner.clone(), |db| db.delete_all::<E>()).await
    }

    async fn drop_table(&self) -> Result<()> {
        run_blocking(self.inner.clone(), |db| db.drop_table::<E>()).await
    }
}
