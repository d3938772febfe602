//! Let catalog entries be excluded from imports.
//!
//! The status `CHECK` can only change through a rebuild, and the FTS sync
//! triggers would follow the renamed table, so they are dropped first and
//! restored against the new table afterwards.

use tokio_rusqlite::rusqlite::Connection;

use super::CATALOG_FTS;
use super::m0003_marketplace_catalog::{CATALOG_COLUMNS, CATALOG_INDEX_NAMES, CATALOG_INDEXES, CATALOG_TABLE};
use crate::Error;
use crate::cache::metadata::set_schema_version;
use crate::cache::migrations::rebuild::TableRebuild;

pub(super) const CATALOG_TABLE_EXCLUDED: &str = "CREATE TABLE marketplace_catalog_entries (
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
    status TEXT NOT NULL DEFAULT 'new'
        CHECK (status IN ('new', 'updated', 'removed', 'imported', 'excluded')),
    detected_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    excluded_at TEXT,
    excluded_reason TEXT,
    UNIQUE (source_id, path)
)";

/// Rebuild `marketplace_catalog_entries` with the given shape, keeping the
/// FTS index in step with it.
pub(super) fn rebuild_catalog(conn: &Connection, create_sql: &str, copy_sql: String) -> Result<(), Error> {
    CATALOG_FTS.drop_triggers(conn)?;

    let mut rebuild = TableRebuild::new("marketplace_catalog_entries").create(create_sql).copy(copy_sql);
    for name in CATALOG_INDEX_NAMES {
        rebuild = rebuild.drop_index(*name);
    }
    for sql in CATALOG_INDEXES {
        rebuild = rebuild.index(*sql);
    }
    rebuild.run(conn)?;
    Ok(())
}

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    rebuild_catalog(
        conn,
        CATALOG_TABLE_EXCLUDED,
        format!(
            "INSERT INTO marketplace_catalog_entries ({CATALOG_COLUMNS})
             SELECT {CATALOG_COLUMNS} FROM _marketplace_catalog_entries_staging"
        ),
    )?;
    CATALOG_FTS.restore(conn)?;
    set_schema_version(conn, "2.1.0")
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    let excluded: i64 = conn.query_row(
        "SELECT COUNT(*) FROM marketplace_catalog_entries WHERE status = 'excluded'",
        [],
        |row| row.get(0),
    )?;
    if excluded > 0 {
        tracing::warn!(excluded, "excluded catalog entries revert to status 'new'");
    }

    let select = CATALOG_COLUMNS.replace("status", "CASE status WHEN 'excluded' THEN 'new' ELSE status END");
    rebuild_catalog(
        conn,
        CATALOG_TABLE,
        format!(
            "INSERT INTO marketplace_catalog_entries ({CATALOG_COLUMNS})
             SELECT {select} FROM _marketplace_catalog_entries_staging"
        ),
    )?;
    CATALOG_FTS.restore(conn)?;
    set_schema_version(conn, "2.0.0")
}
