/// SQLite connection pool setup for the customer store
///
/// Opens the shared pool used by every handler and notification task, applying
/// the configured read isolation to each connection.

use crate::config::{DatabaseConfig, ReadIsolation};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Build connection options for the configured database file
///
/// `ReadUncommitted` only has an effect in shared-cache mode, so both are
/// switched on together.
pub fn connect_options(config: &DatabaseConfig) -> SqliteConnectOptions {
    let options = SqliteConnectOptions::new()
        .filename(Path::new(&config.path))
        .create_if_missing(true);

    match config.read_isolation {
        ReadIsolation::ReadUncommitted => options
            .shared_cache(true)
            .pragma("read_uncommitted", "1"),
        ReadIsolation::Serializable => options.pragma("read_uncommitted", "0"),
    }
}

/// Open the shared connection pool
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(&config.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create database directory '{}': {}", parent.display(), e)
            })?;
        }
    }

    tracing::info!(
        "🗄️ Opening customer database pool: {} (isolation: {:?}, max connections: {})",
        config.path,
        config.read_isolation,
        config.max_connections
    );

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(connect_options(config))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database '{}': {}", config.path, e))?;

    tracing::info!("✅ Customer database pool ready: {}", config.path);

    Ok(pool)
}
