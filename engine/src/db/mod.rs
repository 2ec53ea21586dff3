/// Database module for SQLite persistence
///
/// This module provides the SQLite-backed implementations of the session
/// state store, agent memory, trace log and human review queue. It uses sqlx
/// with parameterized queries and WAL mode for better concurrency.
use anyhow::{Context, Result};
use sdk::errors::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod memory;
pub mod reviews;
pub mod sessions;
pub mod traces;

// Re-export commonly used types
pub use memory::MemoryRepository;
pub use reviews::{PendingReview, ReviewQueue};
pub use sessions::SessionRepository;
pub use traces::TraceRepository;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for better concurrency
    /// 3. Run migrations to set up the schema
    ///
    /// SQLite replays an existing WAL file on open, so a database left behind
    /// by an unclean shutdown recovers here without extra code. Call
    /// `close()` on shutdown to checkpoint the WAL.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        // Configure SQLite connection with WAL mode
        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        // Create connection pool
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are idempotent and can be run multiple times safely.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Create a session state repository
    pub fn sessions(&self, history_limit: usize) -> SessionRepository {
        SessionRepository::new(self.pool.clone(), history_limit)
    }

    /// Create an agent memory repository
    pub fn memories(&self) -> MemoryRepository {
        MemoryRepository::new(self.pool.clone())
    }

    /// Create a trace log repository
    pub fn traces(&self) -> TraceRepository {
        TraceRepository::new(self.pool.clone())
    }

    /// Create a human review queue
    pub fn reviews(&self) -> ReviewQueue {
        ReviewQueue::new(self.pool.clone())
    }
}

/// Convert an adapter error into the contract error type
pub(crate) fn backend(err: anyhow::Error) -> StoreError {
    StoreError::Backend(format!("{:#}", err))
}
