//! Give every artifact a stable uuid that survives renames of its
//! `type:name` key.

use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection};
use uuid::Uuid;

use super::m0001_initial_schema::{ARTIFACT_COLUMNS, ARTIFACT_INDEXES, ARTIFACTS_TABLE};
use crate::Error;
use crate::cache::metadata::set_schema_version;
use crate::cache::migrations::rebuild::TableRebuild;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch("ALTER TABLE artifacts ADD COLUMN uuid TEXT")?;

    let ids: Vec<String> = conn
        .prepare("SELECT id FROM artifacts WHERE uuid IS NULL")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, rusqlite::Error>>()?;

    let mut stmt = conn.prepare("UPDATE artifacts SET uuid = ?1 WHERE id = ?2")?;
    for id in &ids {
        stmt.execute(params![Uuid::new_v4().simple().to_string(), id])?;
    }
    tracing::info!(backfilled = ids.len(), "assigned artifact uuids");

    conn.execute_batch("CREATE UNIQUE INDEX idx_artifacts_uuid ON artifacts(uuid)")?;
    set_schema_version(conn, "1.1.0")
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    let mut rebuild = TableRebuild::new("artifacts")
        .drop_index("idx_artifacts_uuid")
        .drop_index("idx_artifacts_project_id")
        .drop_index("idx_artifacts_type")
        .create(ARTIFACTS_TABLE)
        .copy(format!(
            "INSERT INTO artifacts ({ARTIFACT_COLUMNS}) SELECT {ARTIFACT_COLUMNS} FROM _artifacts_staging"
        ));
    for sql in ARTIFACT_INDEXES {
        rebuild = rebuild.index(*sql);
    }
    rebuild.run(conn)?;

    set_schema_version(conn, "1.0.0")
}
