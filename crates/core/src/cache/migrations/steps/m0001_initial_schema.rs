//! Projects, artifacts keyed by `type:name`, and the metadata table.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;
use crate::cache::metadata::set_schema_version;

pub(super) const ARTIFACTS_TABLE: &str = "CREATE TABLE artifacts (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('skill', 'command', 'agent', 'mcp', 'hook')),
    source TEXT,
    deployed_version TEXT,
    upstream_version TEXT,
    is_outdated INTEGER NOT NULL DEFAULT 0,
    local_modified INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    tags TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

pub(super) const ARTIFACT_COLUMNS: &str = "id, project_id, name, type, source, deployed_version, upstream_version, \
     is_outdated, local_modified, description, tags, created_at, updated_at";

pub(super) const ARTIFACT_INDEXES: &[&str] = &[
    "CREATE INDEX idx_artifacts_project_id ON artifacts(project_id)",
    "CREATE INDEX idx_artifacts_type ON artifacts(type)",
];

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'stale', 'error')),
            last_fetched TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE cache_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    conn.execute_batch(ARTIFACTS_TABLE)?;
    for sql in ARTIFACT_INDEXES {
        conn.execute_batch(sql)?;
    }

    set_schema_version(conn, "1.0.0")
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS artifacts;
         DROP TABLE IF EXISTS projects;
         DROP TABLE IF EXISTS cache_metadata;",
    )?;
    Ok(())
}
