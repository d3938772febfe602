//! Re-key collection membership from the mutable `type:name` id to the
//! artifact uuid.
//!
//! Memberships whose artifact is gone, or has no uuid, cannot be carried
//! over; they are logged and dropped.

use tokio_rusqlite::rusqlite::Connection;

use super::m0002_collections::{COLLECTION_ARTIFACTS_INDEX, COLLECTION_ARTIFACTS_TABLE};
use crate::Error;
use crate::cache::metadata::set_schema_version;
use crate::cache::migrations::rebuild::TableRebuild;

pub(super) const COLLECTION_ARTIFACTS_UUID_TABLE: &str = "CREATE TABLE collection_artifacts (
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    artifact_uuid TEXT NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (collection_id, artifact_uuid)
)";

pub(super) const COLLECTION_ARTIFACTS_UUID_INDEX: &str =
    "CREATE INDEX idx_collection_artifacts_artifact_uuid ON collection_artifacts(artifact_uuid)";

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    let stats = TableRebuild::new("collection_artifacts")
        .drop_index("idx_collection_artifacts_artifact_id")
        .create(COLLECTION_ARTIFACTS_UUID_TABLE)
        .orphans(
            "SELECT s.collection_id || ' -> ' || s.artifact_id
             FROM _collection_artifacts_staging s
             LEFT JOIN artifacts a ON a.id = s.artifact_id
             WHERE a.id IS NULL OR a.uuid IS NULL",
        )
        .copy(
            "INSERT INTO collection_artifacts (collection_id, artifact_uuid, added_at)
             SELECT s.collection_id, a.uuid, s.added_at
             FROM _collection_artifacts_staging s
             JOIN artifacts a ON a.id = s.artifact_id
             WHERE a.uuid IS NOT NULL",
        )
        .index(COLLECTION_ARTIFACTS_UUID_INDEX)
        .run(conn)?;

    if stats.orphaned > 0 {
        tracing::warn!(orphaned = stats.orphaned, "collection memberships without a resolvable artifact were dropped");
    }
    set_schema_version(conn, "2.0.0")
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    TableRebuild::new("collection_artifacts")
        .drop_index("idx_collection_artifacts_artifact_uuid")
        .create(COLLECTION_ARTIFACTS_TABLE)
        .orphans(
            "SELECT s.collection_id || ' -> ' || s.artifact_uuid
             FROM _collection_artifacts_staging s
             LEFT JOIN artifacts a ON a.uuid = s.artifact_uuid
             WHERE a.id IS NULL",
        )
        .copy(
            "INSERT INTO collection_artifacts (collection_id, artifact_id, added_at)
             SELECT s.collection_id, a.id, s.added_at
             FROM _collection_artifacts_staging s
             JOIN artifacts a ON a.uuid = s.artifact_uuid",
        )
        .index(COLLECTION_ARTIFACTS_INDEX)
        .run(conn)?;

    set_schema_version(conn, "1.1.0")
}
