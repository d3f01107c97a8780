use std::str::FromStr;

use dirnode_core::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Durable metadata store. SQLite is the reference backend (spec.md §4.3);
/// the connection pool serializes writes behind SQLite's WAL mode, matching
/// spec.md §5's "shared resources" guidance.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Opens (creating if absent) the SQLite file at `path` and runs
    /// pending migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|error| anyhow::anyhow!("invalid sqlite path {path}: {error}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // A single shared in-memory database must use exactly one
        // connection, otherwise each pooled connection sees its own
        // private, empty database.
        let max_connections = if path == ":memory:" { 1 } else { 8 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|error| anyhow::anyhow!("failed to open database at {path}: {error}"))?;

        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// An in-memory database, primarily for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        Database::connect(":memory:").await
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("src/migrations")
            .run(&self.pool)
            .await
            .map_err(|error| anyhow::anyhow!("migration failed: {error}"))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
