//! Staging-table rebuilds.
//!
//! SQLite cannot drop a constraint, change a `CHECK`, or alter a primary key
//! in place. Migrations that need one of those go through [`TableRebuild`]:
//!
//! 1. drop the indexes that would collide with the new table's
//! 2. rename the live table to `_<table>_staging`
//! 3. create the new table
//! 4. log orphans, then copy rows with `INSERT ... SELECT`
//! 5. recreate indexes
//! 6. drop the staging table
//!
//! The copy statement may join parent tables to resolve keys; rows the join
//! cannot resolve are dropped, and the optional orphan query logs each of
//! them first.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

/// Name of the staging table a rebuild of `table` uses.
pub fn staging_table(table: &str) -> String {
    format!("_{table}_staging")
}

/// Outcome of a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub copied: usize,
    pub orphaned: usize,
}

/// Builder for a staging-table rebuild.
#[derive(Debug, Clone)]
pub struct TableRebuild {
    table: String,
    drop_indexes: Vec<String>,
    create_sql: Option<String>,
    orphan_sql: Option<String>,
    copy_sql: Option<String>,
    index_sql: Vec<String>,
}

impl TableRebuild {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            drop_indexes: Vec::new(),
            create_sql: None,
            orphan_sql: None,
            copy_sql: None,
            index_sql: Vec::new(),
        }
    }

    /// Index to drop before the rename.
    pub fn drop_index(mut self, name: impl Into<String>) -> Self {
        self.drop_indexes.push(name.into());
        self
    }

    /// `CREATE TABLE` statement for the new shape.
    pub fn create(mut self, sql: impl Into<String>) -> Self {
        self.create_sql = Some(sql.into());
        self
    }

    /// Query over the staging table returning one text column describing
    /// each row the copy will drop.
    pub fn orphans(mut self, sql: impl Into<String>) -> Self {
        self.orphan_sql = Some(sql.into());
        self
    }

    /// `INSERT INTO <table> ... SELECT ... FROM _<table>_staging`.
    pub fn copy(mut self, sql: impl Into<String>) -> Self {
        self.copy_sql = Some(sql.into());
        self
    }

    /// Index to create once rows are copied.
    pub fn index(mut self, sql: impl Into<String>) -> Self {
        self.index_sql.push(sql.into());
        self
    }

    /// Execute the rebuild on `conn`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MigrationFailed` if the builder lacks a create or
    /// copy statement; any SQL failure is returned as is.
    pub fn run(&self, conn: &Connection) -> Result<RebuildStats, Error> {
        let create_sql = self
            .create_sql
            .as_deref()
            .ok_or_else(|| Error::MigrationFailed(format!("rebuild of {} has no CREATE statement", self.table)))?;
        let copy_sql = self
            .copy_sql
            .as_deref()
            .ok_or_else(|| Error::MigrationFailed(format!("rebuild of {} has no copy statement", self.table)))?;
        let staging = staging_table(&self.table);

        for index in &self.drop_indexes {
            conn.execute_batch(&format!("DROP INDEX IF EXISTS {index}"))?;
        }

        conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {staging}", self.table))?;
        conn.execute_batch(create_sql)?;

        let mut orphaned = 0;
        if let Some(sql) = &self.orphan_sql {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                let row = row?;
                tracing::warn!(table = %self.table, row = %row, "dropping orphaned row during rebuild");
                orphaned += 1;
            }
        }

        let copied = conn.execute(copy_sql, [])?;

        for sql in &self.index_sql {
            conn.execute_batch(sql)?;
        }

        conn.execute_batch(&format!("DROP TABLE {staging}"))?;

        tracing::info!(table = %self.table, copied, orphaned, "rebuilt table");
        Ok(RebuildStats { copied, orphaned })
    }
}

/// Primary key columns of `table`, in key order.
pub fn primary_key_columns(conn: &Connection, table: &str) -> Result<Vec<String>, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut columns: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(5)?, row.get::<_, String>(1)?)))?
        .filter_map(|row| match row {
            Ok((pk, name)) if pk > 0 => Some(Ok((pk, name))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<_, _>>()?;
    columns.sort_by_key(|(pk, _)| *pk);
    Ok(columns.into_iter().map(|(_, name)| name).collect())
}

/// True if a table (or virtual table) called `name` exists.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, Error> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// True if `table` has a column called `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE parents (id TEXT PRIMARY KEY, uuid TEXT NOT NULL UNIQUE);
             CREATE TABLE links (parent_key TEXT NOT NULL, note TEXT);
             CREATE INDEX idx_links_parent ON links(parent_key);
             INSERT INTO parents VALUES ('skill:a', 'u-a'), ('skill:b', 'u-b');
             INSERT INTO links VALUES ('skill:a', 'one'), ('skill:b', 'two'), ('skill:gone', 'three');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_staging_name() {
        assert_eq!(staging_table("artifacts"), "_artifacts_staging");
    }

    #[test]
    fn test_rebuild_resolves_keys_and_drops_orphans() {
        let conn = fixture();
        let stats = TableRebuild::new("links")
            .drop_index("idx_links_parent")
            .create("CREATE TABLE links (parent_uuid TEXT NOT NULL, note TEXT, PRIMARY KEY (parent_uuid, note))")
            .orphans(
                "SELECT s.parent_key FROM _links_staging s LEFT JOIN parents p ON p.id = s.parent_key WHERE p.id IS NULL",
            )
            .copy(
                "INSERT INTO links (parent_uuid, note) SELECT p.uuid, s.note FROM _links_staging s JOIN parents p ON p.id = s.parent_key",
            )
            .index("CREATE INDEX idx_links_parent ON links(parent_uuid)")
            .run(&conn)
            .unwrap();

        assert_eq!(stats, RebuildStats { copied: 2, orphaned: 1 });
        assert_eq!(primary_key_columns(&conn, "links").unwrap(), vec!["parent_uuid", "note"]);
        assert!(!table_exists(&conn, "_links_staging").unwrap());
        assert!(column_exists(&conn, "links", "parent_uuid").unwrap());
        assert!(!column_exists(&conn, "links", "parent_key").unwrap());

        let notes: Vec<String> = conn
            .prepare("SELECT note FROM links ORDER BY note")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(notes, vec!["one", "two"]);
    }

    #[test]
    fn test_rebuild_requires_statements() {
        let conn = fixture();
        let err = TableRebuild::new("links").run(&conn).unwrap_err();
        assert!(matches!(err, Error::MigrationFailed(_)));
        assert!(table_exists(&conn, "links").unwrap());
    }

    #[test]
    fn test_primary_key_of_rowid_table_is_empty() {
        let conn = fixture();
        assert!(primary_key_columns(&conn, "links").unwrap().is_empty());
        assert_eq!(primary_key_columns(&conn, "parents").unwrap(), vec!["id"]);
    }
}
