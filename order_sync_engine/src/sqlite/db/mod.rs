//! Low-level SQLite queries.
//!
//! Everything in here is a plain function taking a `&mut SqliteConnection`, so callers decide the
//! transaction scope: grab a connection from the pool for one-shot reads, or pass `&mut *tx` to
//! compose several calls atomically.
use std::env;

use log::info;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod restaurants;

const SQLITE_DB_URL: &str = "sqlite://data/rog_store.db";

pub fn db_url() -> String {
    let result = env::var("ROG_DATABASE_URL").unwrap_or_else(|_| {
        info!("ROG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(30));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
