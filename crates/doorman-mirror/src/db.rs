//! SQLite connection pool for the mirror database.
//!
//! The mirror is a plain file next to the station data directories. The
//! schema is created on open, so pointing the station at an empty path is
//! all the setup there is.

use crate::error::{MirrorError, MirrorResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Statements run on every open. All idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nfc_uid TEXT NOT NULL UNIQUE,
        user_name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        created_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS access_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uid TEXT NOT NULL,
        event_time TEXT NOT NULL,
        status TEXT NOT NULL,
        station_id INTEGER NOT NULL,
        user_name TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_access_log_event_time ON access_log (event_time)",
    "CREATE INDEX IF NOT EXISTS idx_access_log_uid ON access_log (uid)",
];

/// Mirror database and batch schedule configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// Path to the SQLite database file.
    pub database_path: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Hour of the daily scheduled batch run (0-23).
    pub batch_hour: u8,

    /// Minute of the daily scheduled batch run (0-59).
    pub batch_minute: u8,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            database_path: "doorman.db".to_string(),
            max_connections: 5,
            batch_hour: 23,
            batch_minute: 50,
        }
    }
}

impl MirrorConfig {
    /// Create a configuration for the given database path.
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the daily batch run time.
    pub fn schedule(mut self, hour: u8, minute: u8) -> Self {
        self.batch_hour = hour;
        self.batch_minute = minute;
        self
    }
}

/// Connection pool wrapper around the mirror file.
#[derive(Debug, Clone)]
pub struct MirrorDb {
    pool: SqlitePool,
}

impl MirrorDb {
    /// Open (or create) the mirror database and apply the schema.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use doorman_mirror::{MirrorConfig, MirrorDb};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = MirrorConfig::new("doorman.db").schedule(23, 50);
    /// let db = MirrorDb::open(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: MirrorConfig) -> MirrorResult<Self> {
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MirrorError::Configuration(format!("cannot create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database_path))
            .map_err(|e| MirrorError::Configuration(format!("invalid database path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create an in-memory mirror, primarily for tests.
    pub async fn in_memory() -> MirrorResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // In-memory databases live per connection, so the pool must not
        // hand out a second one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> MirrorResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for in-flight connections to drain.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Verify the connection with a trivial query.
    pub async fn health_check(&self) -> MirrorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
