// src/db.rs
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::error::StoreResult;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn create_pool(config: &Config) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Create the users, polls, answers and poll_user tables.
pub async fn migrate(pool: &Pool<Postgres>) -> StoreResult<()> {
    tracing::info!("running poll migrations");
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Drop the poll tables again. `users` belongs to the auth layer and is kept.
pub async fn rollback(pool: &Pool<Postgres>) -> StoreResult<()> {
    tracing::info!("reverting poll migrations");
    MIGRATOR.undo(pool, 0).await?;
    Ok(())
}
