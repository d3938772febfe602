//! Index text extracted from artifact bodies alongside the catalog metadata.

use tokio_rusqlite::rusqlite::Connection;

use super::m0003_marketplace_catalog::CATALOG_COLUMNS;
use super::m0009_catalog_excluded_status::{CATALOG_TABLE_EXCLUDED, rebuild_catalog};
use super::{CATALOG_FTS, CATALOG_FTS_DEEP};
use crate::Error;
use crate::cache::migrations::rebuild::column_exists;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    if !column_exists(conn, "marketplace_catalog_entries", "deep_search_text")? {
        conn.execute_batch("ALTER TABLE marketplace_catalog_entries ADD COLUMN deep_search_text TEXT")?;
    }

    CATALOG_FTS.drop(conn)?;
    CATALOG_FTS_DEEP.create(conn)?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    CATALOG_FTS_DEEP.drop(conn)?;

    let columns = format!("{CATALOG_COLUMNS}, excluded_at, excluded_reason");
    rebuild_catalog(
        conn,
        CATALOG_TABLE_EXCLUDED,
        format!(
            "INSERT INTO marketplace_catalog_entries ({columns})
             SELECT {columns} FROM _marketplace_catalog_entries_staging"
        ),
    )?;

    CATALOG_FTS.create(conn)?;
    Ok(())
}
