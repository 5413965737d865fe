//! SQLite connection pool for the chunk store.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::DbConfig;

const MAX_CONNECTIONS: u32 = 5;

/// Writers wait this long for the database lock before reporting a storage error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a pool on `[db].path`, creating the file and its directory on first use.
pub async fn connect(db: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = db.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&db.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db.path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = DbConfig {
            path: tmp.path().join("nested/dir/kb.sqlite"),
        };
        let pool = connect(&db).await.unwrap();
        pool.close().await;
        assert!(db.path.exists());
    }
}
