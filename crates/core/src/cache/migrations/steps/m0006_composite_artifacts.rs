//! Composite artifacts (plugins, stacks, suites) and their child memberships.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE composite_artifacts (
            id TEXT PRIMARY KEY,
            collection_id TEXT REFERENCES collections(id) ON DELETE CASCADE,
            composite_type TEXT NOT NULL DEFAULT 'plugin'
                CHECK (composite_type IN ('plugin', 'stack', 'suite')),
            display_name TEXT,
            description TEXT,
            metadata_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE composite_memberships (
            composite_id TEXT NOT NULL REFERENCES composite_artifacts(id) ON DELETE CASCADE,
            child_artifact_uuid TEXT NOT NULL REFERENCES artifacts(uuid) ON DELETE CASCADE,
            relationship_type TEXT NOT NULL DEFAULT 'contains',
            pinned_version_hash TEXT,
            position INTEGER,
            created_at TEXT NOT NULL,
            PRIMARY KEY (composite_id, child_artifact_uuid)
        );

        CREATE INDEX idx_composite_artifacts_collection_id ON composite_artifacts(collection_id);
        CREATE INDEX idx_composite_memberships_child ON composite_memberships(child_artifact_uuid);",
    )?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS composite_memberships;
         DROP TABLE IF EXISTS composite_artifacts;",
    )?;
    Ok(())
}
