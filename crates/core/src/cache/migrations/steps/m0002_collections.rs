//! Collections own groups and artifact associations; both cascade.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

/// Membership keyed by the mutable `type:name` artifact id.
pub(super) const COLLECTION_ARTIFACTS_TABLE: &str = "CREATE TABLE collection_artifacts (
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    artifact_id TEXT NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (collection_id, artifact_id)
)";

pub(super) const COLLECTION_ARTIFACTS_INDEX: &str =
    "CREATE INDEX idx_collection_artifacts_artifact_id ON collection_artifacts(artifact_id)";

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE collections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE groups (
            id TEXT PRIMARY KEY,
            collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            position INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (collection_id, name)
        );

        CREATE INDEX idx_groups_collection_id ON groups(collection_id);",
    )?;

    conn.execute_batch(COLLECTION_ARTIFACTS_TABLE)?;
    conn.execute_batch(COLLECTION_ARTIFACTS_INDEX)?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS collection_artifacts;
         DROP TABLE IF EXISTS groups;
         DROP TABLE IF EXISTS collections;",
    )?;
    Ok(())
}
