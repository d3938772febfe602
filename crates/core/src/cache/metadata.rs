//! Key-value schema metadata.
//!
//! The `schema_version` key is bumped by hand in the migrations that make
//! breaking structural changes. Nothing derives it from the revision chain,
//! so [`SCHEMA_VERSION`] is what the head is expected to carry and the
//! schema check reports any mismatch.

use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension};

use super::connection::CacheDb;
use crate::Error;

/// `schema_version` value written by the head migration.
pub const SCHEMA_VERSION: &str = "2.2.0";

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";

pub(crate) fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, Error> {
    let value = conn
        .query_row("SELECT value FROM cache_metadata WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub(crate) fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cache_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub(crate) fn set_schema_version(conn: &Connection, version: &str) -> Result<(), Error> {
    set_metadata(conn, SCHEMA_VERSION_KEY, version)?;
    tracing::debug!(version, "schema_version updated");
    Ok(())
}

/// Read `schema_version`; `None` if the metadata table does not exist yet.
pub(crate) fn schema_version(conn: &Connection) -> Result<Option<String>, Error> {
    match get_metadata(conn, SCHEMA_VERSION_KEY) {
        Ok(value) => Ok(value),
        Err(Error::Database(tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(_, Some(msg)))))
            if msg.contains("no such table") =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl CacheDb {
    /// Read a metadata value.
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> { get_metadata(conn, &key) })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a metadata value.
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { set_metadata(conn, &key, &value) })
            .await
            .map_err(Error::from)
    }

    /// Logical schema version recorded by the migrations.
    pub async fn schema_version(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> { schema_version(conn) })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::migrations::Target;

    #[tokio::test]
    async fn test_head_carries_schema_version() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap().as_deref(), Some(SCHEMA_VERSION));
    }

    #[tokio::test]
    async fn test_schema_version_follows_downgrades() {
        let db = CacheDb::open_in_memory().await.unwrap();

        db.downgrade(Target::Revision("0008_repair_collection_artifacts_pk".into())).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap().as_deref(), Some("2.0.0"));

        db.downgrade(Target::Revision("0004_catalog_fts".into())).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap().as_deref(), Some("1.0.0"));

        db.downgrade(Target::Base).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_and_get_metadata() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_metadata("last_sync").await.unwrap().is_none());

        db.set_metadata("last_sync", "2025-01-01").await.unwrap();
        db.set_metadata("last_sync", "2025-02-01").await.unwrap();
        assert_eq!(db.get_metadata("last_sync").await.unwrap().as_deref(), Some("2025-02-01"));
    }
}
