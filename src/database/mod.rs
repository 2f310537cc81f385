use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

use crate::config::DatabaseConfig;

mod schema;
pub mod models;
pub mod provisioning;

#[cfg(test)]
mod tests;

pub use schema::create_schema;

/// Shared SQLite connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Create the connection pool. Every connection gets foreign keys, WAL
/// journaling and the configured busy timeout.
pub fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let db_path = &config.path;

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    let busy_timeout = config.busy_timeout();
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        // journal_mode answers with the resulting mode
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .context("Failed to create database connection pool")?;

    debug!("Connection pool ready for {} ({} connections)", db_path, config.max_connections);
    Ok(pool)
}

/// Initialize the database: build the pool and make sure the schema exists
pub fn initialize(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = create_pool(config)?;

    let mut conn = pool.get().context("Failed to get a database connection")?;
    create_schema(&mut conn).context("Failed to create database schema")?;

    info!("Database initialized successfully at {}", config.path);
    Ok(pool)
}

/// Start a write transaction holding the database write lock from the start.
/// Concurrent writers wait up to the busy timeout.
pub fn begin_immediate(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Format a timestamp for storage. The fixed precision keeps text order
/// identical to chronological order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp from column `idx`
pub fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
