//! Repair databases where `collection_artifacts` lost its composite primary
//! key.
//!
//! Some caches reached 0007 with a table that had the right columns but no
//! `(collection_id, artifact_uuid)` key, and picked up duplicate rows. The
//! repair keeps the earliest `added_at` of each pair. A correct table is left
//! untouched.

use tokio_rusqlite::rusqlite::Connection;

use super::m0007_collection_artifacts_uuid::{COLLECTION_ARTIFACTS_UUID_INDEX, COLLECTION_ARTIFACTS_UUID_TABLE};
use crate::Error;
use crate::cache::migrations::rebuild::{TableRebuild, primary_key_columns};

const EXPECTED_KEY: [&str; 2] = ["collection_id", "artifact_uuid"];

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    let key = primary_key_columns(conn, "collection_artifacts")?;
    if key == EXPECTED_KEY {
        tracing::debug!("collection_artifacts primary key already correct");
        return Ok(());
    }

    tracing::warn!(found = ?key, "collection_artifacts primary key is wrong; rebuilding");
    let stats = TableRebuild::new("collection_artifacts")
        .drop_index("idx_collection_artifacts_artifact_uuid")
        .create(COLLECTION_ARTIFACTS_UUID_TABLE)
        .orphans(
            "SELECT collection_id || ' -> (null)' FROM _collection_artifacts_staging
             WHERE artifact_uuid IS NULL OR collection_id IS NULL",
        )
        .copy(
            "INSERT INTO collection_artifacts (collection_id, artifact_uuid, added_at)
             SELECT collection_id, artifact_uuid, MIN(added_at)
             FROM _collection_artifacts_staging
             WHERE artifact_uuid IS NOT NULL AND collection_id IS NOT NULL
             GROUP BY collection_id, artifact_uuid",
        )
        .index(COLLECTION_ARTIFACTS_UUID_INDEX)
        .run(conn)?;

    tracing::info!(kept = stats.copied, "collection_artifacts de-duplicated");
    Ok(())
}

/// The repaired shape is what 0007 meant to produce; there is nothing to undo.
pub(super) fn downgrade(_conn: &Connection) -> Result<(), Error> {
    Ok(())
}
