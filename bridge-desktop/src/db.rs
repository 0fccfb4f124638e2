//! SQLite pool setup shared by the desktop stores.

use std::path::Path;

use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

pub(crate) fn db_error(context: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("{}: {}", context, e))
}

/// Open (creating if needed) the database file at `db_path`.
pub(crate) async fn open(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| db_error("Failed to connect to DB", e))?;

    debug!(path = ?db_path, "Opened SQLite database");
    Ok(pool)
}

/// Private in-memory database. A single connection keeps every query on
/// the same database.
pub(crate) async fn open_in_memory() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| db_error("Failed to open in-memory DB", e))
}

pub(crate) async fn execute_schema(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| db_error("Failed to create schema", e))?;
    }
    Ok(())
}
