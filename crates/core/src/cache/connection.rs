//! Database connection management with pragma configuration.
//!
//! [`CacheDb::open`] brings the schema to head before returning, which is
//! what the repositories expect. [`CacheDb::connect`] only applies pragmas
//! and leaves the schema alone, for callers that drive migrations by hand.
//! [`CacheDb::connect_existing`] does the same but refuses to create a file.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::OpenFlags;

const SESSION_PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open the database at `path` and upgrade it to head.
    ///
    /// Creates the parent directory and the file if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = Self::connect(path).await?;
        migrations::run(&db.conn).await?;
        Ok(db)
    }

    /// Open an in-memory database at head, for tests.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let db = Self::connect_in_memory().await?;
        migrations::run(&db.conn).await?;
        Ok(db)
    }

    /// Open the database at `path` without touching the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::configure(&conn).await?;
        tracing::debug!(path = %path.display(), "opened cache database");

        Ok(Self { conn })
    }

    /// Open an existing database file without touching the schema.
    ///
    /// A missing file is `Error::NotFound`; nothing is created on disk.
    pub async fn connect_existing(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        std::fs::metadata(path).map_err(|e| Error::from_io(e, path))?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configure(&conn).await?;
        tracing::debug!(path = %path.display(), "opened existing cache database");

        Ok(Self { conn })
    }

    /// In-memory database without migrations applied.
    pub async fn connect_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configure(&conn).await?;
        Ok(Self { conn })
    }

    async fn configure(conn: &Connection) -> Result<(), Error> {
        conn.call(|conn| {
            conn.execute_batch(SESSION_PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)
    }
}
