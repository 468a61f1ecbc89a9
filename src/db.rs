use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Build the PostgreSQL connection pool. Constructed once at startup and
/// injected into the store; nothing in the crate reaches for a global pool.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(2))
        .idle_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;
    Ok(pool)
}
