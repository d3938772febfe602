//! FTS5 index maintenance for migrations.
//!
//! FTS5 virtual tables cannot be altered, so a change to the indexed columns
//! means dropping the sync triggers and the table, recreating both and
//! rebuilding the index from the content table. SQLite builds without FTS5
//! fail those statements with `no such module: fts5`; that one failure is
//! logged and skipped, everything else aborts the migration.

use tokio_rusqlite::rusqlite::{self, Connection};

use super::rebuild::table_exists;
use crate::Error;

/// True if `err` means the FTS5 extension is not compiled in.
pub fn is_fts5_unavailable(err: &rusqlite::Error) -> bool {
    err.to_string().contains("no such module: fts5")
}

/// Run `sql`, turning an unavailable FTS5 module into `Ok(false)`.
fn run_guarded(conn: &Connection, sql: &str, table: &str) -> Result<bool, Error> {
    match conn.execute_batch(sql) {
        Ok(()) => Ok(true),
        Err(e) if is_fts5_unavailable(&e) => {
            tracing::warn!(table, "FTS5 not available in this SQLite build; skipping full-text index");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// External-content FTS5 table kept in sync with a content table by triggers.
#[derive(Debug, Clone, Copy)]
pub struct FtsIndex<'a> {
    pub table: &'a str,
    pub content_table: &'a str,
    pub columns: &'a [&'a str],
}

impl FtsIndex<'_> {
    fn trigger(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.table)
    }

    fn column_list(&self, prefix: &str) -> String {
        self.columns
            .iter()
            .map(|c| format!("{prefix}{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True if the virtual table exists.
    pub fn exists(&self, conn: &Connection) -> Result<bool, Error> {
        table_exists(conn, self.table)
    }

    /// Create table and triggers, then index existing rows.
    ///
    /// Returns `Ok(false)` when FTS5 is unavailable.
    pub fn create(&self, conn: &Connection) -> Result<bool, Error> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                {},
                content='{}',
                content_rowid='rowid',
                tokenize='porter unicode61'
            )",
            self.table,
            self.column_list(""),
            self.content_table
        );
        if !run_guarded(conn, &sql, self.table)? {
            return Ok(false);
        }

        self.create_triggers(conn)?;
        self.rebuild(conn)?;
        tracing::debug!(table = self.table, "created FTS5 index");
        Ok(true)
    }

    /// Create the insert, delete and update sync triggers.
    pub fn create_triggers(&self, conn: &Connection) -> Result<(), Error> {
        let table = self.table;
        let content = self.content_table;
        let cols = self.column_list("");
        let new_vals = self.column_list("new.");
        let old_vals = self.column_list("old.");

        conn.execute_batch(&format!(
            "CREATE TRIGGER IF NOT EXISTS {ai} AFTER INSERT ON {content} BEGIN
                INSERT INTO {table}(rowid, {cols}) VALUES (new.rowid, {new_vals});
            END;
            CREATE TRIGGER IF NOT EXISTS {ad} AFTER DELETE ON {content} BEGIN
                INSERT INTO {table}({table}, rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
            END;
            CREATE TRIGGER IF NOT EXISTS {au} AFTER UPDATE ON {content} BEGIN
                INSERT INTO {table}({table}, rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
                INSERT INTO {table}(rowid, {cols}) VALUES (new.rowid, {new_vals});
            END;",
            ai = self.trigger("ai"),
            ad = self.trigger("ad"),
            au = self.trigger("au"),
        ))?;
        Ok(())
    }

    /// Drop the sync triggers.
    pub fn drop_triggers(&self, conn: &Connection) -> Result<(), Error> {
        for suffix in ["ai", "ad", "au"] {
            conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {}", self.trigger(suffix)))?;
        }
        Ok(())
    }

    /// Drop triggers and the virtual table.
    pub fn drop(&self, conn: &Connection) -> Result<(), Error> {
        self.drop_triggers(conn)?;
        run_guarded(conn, &format!("DROP TABLE IF EXISTS {}", self.table), self.table)?;
        Ok(())
    }

    /// Re-index every row of the content table.
    pub fn rebuild(&self, conn: &Connection) -> Result<(), Error> {
        run_guarded(conn, &format!("INSERT INTO {t}({t}) VALUES ('rebuild')", t = self.table), self.table)?;
        Ok(())
    }

    /// After a content-table rebuild: restore triggers and re-index, if the
    /// index exists at all.
    pub fn restore(&self, conn: &Connection) -> Result<(), Error> {
        if self.exists(conn)? {
            self.create_triggers(conn)?;
            self.rebuild(conn)?;
        }
        Ok(())
    }
}
