//! Database module for flyfeed.
//!
//! Provides the SQLite connection pool and schema setup used by the
//! persistent feed item store.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::Result;

/// Connection pool type used by the repositories.
pub type DbPool = SqlitePool;

/// Schema statements, applied in order. Each one is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS feed_items (
        id           TEXT PRIMARY KEY,
        title        TEXT NOT NULL,
        url          TEXT NOT NULL,
        source       TEXT NOT NULL,
        source_type  TEXT NOT NULL,
        author       TEXT NOT NULL DEFAULT '',
        summary      TEXT NOT NULL DEFAULT '',
        content      TEXT,
        published_at TEXT NOT NULL,
        fetched_at   TEXT NOT NULL,
        thumbnail    TEXT,
        tags         TEXT NOT NULL DEFAULT '[]',
        upvotes      INTEGER,
        comments     INTEGER,
        search_text  TEXT NOT NULL DEFAULT '[]',
        tags_folded  TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_feed_items_published_at ON feed_items (published_at)",
    "CREATE INDEX IF NOT EXISTS idx_feed_items_fetched_at ON feed_items (fetched_at)",
    "CREATE INDEX IF NOT EXISTS idx_feed_items_source ON feed_items (source)",
];

/// Database wrapper owning the SQLite pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// The pool is limited to one connection: every SQLite in-memory
    /// connection is a separate database.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Apply the schema.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Applied {} schema statements", SCHEMA.len());
        Ok(())
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
