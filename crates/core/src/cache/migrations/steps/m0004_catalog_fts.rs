use tokio_rusqlite::rusqlite::Connection;

use super::CATALOG_FTS;
use crate::Error;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    CATALOG_FTS.create(conn)?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    CATALOG_FTS.drop(conn)
}
