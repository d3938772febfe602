//! Marketplace sources and the entries detected in them.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

pub(super) const CATALOG_TABLE: &str = "CREATE TABLE marketplace_catalog_entries (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES marketplace_sources(id) ON DELETE CASCADE,
    artifact_type TEXT NOT NULL CHECK (artifact_type IN ('skill', 'command', 'agent', 'mcp', 'hook')),
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    upstream_url TEXT,
    detected_version TEXT,
    confidence_score INTEGER NOT NULL DEFAULT 0 CHECK (confidence_score BETWEEN 0 AND 100),
    title TEXT,
    description TEXT,
    search_tags TEXT,
    status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'updated', 'removed', 'imported')),
    detected_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (source_id, path)
)";

pub(super) const CATALOG_COLUMNS: &str = "id, source_id, artifact_type, name, path, upstream_url, detected_version, \
     confidence_score, title, description, search_tags, status, detected_at, updated_at";

pub(super) const CATALOG_INDEXES: &[&str] = &[
    "CREATE INDEX idx_catalog_entries_source_id ON marketplace_catalog_entries(source_id)",
    "CREATE INDEX idx_catalog_entries_status ON marketplace_catalog_entries(status)",
];

pub(super) const CATALOG_INDEX_NAMES: &[&str] = &["idx_catalog_entries_source_id", "idx_catalog_entries_status"];

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE marketplace_sources (
            id TEXT PRIMARY KEY,
            repo_url TEXT NOT NULL UNIQUE,
            owner TEXT NOT NULL,
            repo_name TEXT NOT NULL,
            ref TEXT NOT NULL DEFAULT 'main',
            trust_level TEXT NOT NULL DEFAULT 'basic'
                CHECK (trust_level IN ('untrusted', 'basic', 'verified', 'official')),
            last_sync_at TEXT,
            artifact_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    conn.execute_batch(CATALOG_TABLE)?;
    for sql in CATALOG_INDEXES {
        conn.execute_batch(sql)?;
    }
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS marketplace_catalog_entries;
         DROP TABLE IF EXISTS marketplace_sources;",
    )?;
    Ok(())
}
