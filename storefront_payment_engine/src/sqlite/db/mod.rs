//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can use a pooled connection, or open a write transaction with [`begin_immediate`] and pass the
//! same connection through several calls before handing it to [`finish`].
use std::env;

use log::*;
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    Sqlite,
    SqlitePool,
};

pub mod accounts;
pub mod catalog;
pub mod fulfilment;
pub mod orders;
pub mod payment_intents;
pub mod webhooks;

const SQLITE_DB_URL: &str = "sqlite://data/storefront.db";

pub fn db_url() -> String {
    let result = env::var("SFP_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ SFP_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = url.parse::<SqliteConnectOptions>()?.create_if_missing(true).foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Acquires a connection and opens a write transaction on it with `BEGIN IMMEDIATE`, so that the write lock is taken
/// up front and concurrent writers queue on the busy timeout instead of failing on lock upgrade.
///
/// The transaction must be closed with [`finish`].
pub async fn begin_immediate(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>, SqlxError> {
    let mut conn = pool.acquire().await?;
    match sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
        Ok(_) => Ok(conn),
        // A connection can come back to the pool with a transaction left open by a cancelled request
        Err(SqlxError::Database(e)) if e.message().contains("within a transaction") => {
            warn!("🗃️ Rolling back a transaction that was left open on a pooled connection");
            sqlx::query("ROLLBACK").execute(&mut *conn).await?;
            sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
            Ok(conn)
        },
        Err(e) => Err(e),
    }
}

/// Commits the transaction opened by [`begin_immediate`] if `result` is `Ok`, and rolls it back otherwise.
pub async fn finish<T, E: From<SqlxError>>(mut conn: PoolConnection<Sqlite>, result: Result<T, E>) -> Result<T, E> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        },
        Err(e) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                error!("🗃️ Rollback failed: {rollback_err}. Discarding the connection.");
                drop(conn.detach());
            }
            Err(e)
        },
    }
}
