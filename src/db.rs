// src/db.rs
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::store::{MemoryStore, PgStore, Storage};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Picks the backend: Postgres when `DATABASE_URL` is set, memory otherwise.
pub async fn connect(config: &Config) -> Result<Arc<dyn Storage>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.max_connections).await?;
            info!(max_connections = config.max_connections, "connected to postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, polls and votes are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
