//! Async access to the `plants` table.
//!
//! Diesel is synchronous, so every call checks a connection out of the pool
//! and runs on tokio's blocking thread pool.

use diesel::prelude::*;
use diesel::r2d2::PoolError;
use thiserror::Error;

use crate::actions::{self, ImageUpsert};
use crate::db::DbPool;
use crate::models::{Plant, PlantInput};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("migration failed: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),

    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct PlantStore {
    pool: DbPool,
}

impl PlantStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn run<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = pool.get()?;
            Ok(query(&mut *conn)?)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<Plant>, StoreError> {
        let rows = self.run(actions::list_plants).await?;
        Ok(rows.into_iter().map(Plant::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<Plant>, StoreError> {
        let row = self
            .run(move |conn| actions::find_plant_by_id(conn, id))
            .await?;
        Ok(row.map(Plant::from))
    }

    pub async fn create(&self, input: PlantInput) -> Result<i32, StoreError> {
        let new_plant = input.into_new_plant();
        self.run(move |conn| actions::insert_new_plant(conn, &new_plant))
            .await
    }

    /// Coalesce-merge `input` into plant `id`. Returns the affected row count.
    pub async fn update(&self, id: i32, input: PlantInput) -> Result<usize, StoreError> {
        let changes = input.into_changes();
        self.run(move |conn| actions::update_plant(conn, id, &changes))
            .await
    }

    pub async fn delete(&self, id: i32) -> Result<usize, StoreError> {
        self.run(move |conn| actions::delete_plant(conn, id)).await
    }

    pub async fn cached_image(&self, name: &str) -> Result<Option<String>, StoreError> {
        let name = name.to_owned();
        self.run(move |conn| actions::find_cached_image(conn, &name))
            .await
    }

    pub async fn save_image(&self, name: &str, url: &str) -> Result<ImageUpsert, StoreError> {
        let (name, url) = (name.to_owned(), url.to_owned());
        self.run(move |conn| actions::upsert_plant_image(conn, &name, &url))
            .await
    }
}
