//! Project memory: typed knowledge items and the context modules that
//! bundle them.

use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE memory_items (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            type TEXT NOT NULL
                CHECK (type IN ('decision', 'constraint', 'gotcha', 'style_rule', 'learning')),
            content TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.75 CHECK (confidence >= 0.0 AND confidence <= 1.0),
            status TEXT NOT NULL DEFAULT 'candidate'
                CHECK (status IN ('candidate', 'active', 'stable', 'deprecated')),
            provenance_json TEXT,
            anchors_json TEXT,
            ttl_policy_json TEXT,
            content_hash TEXT NOT NULL UNIQUE,
            access_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deprecated_at TEXT
        );

        CREATE INDEX idx_memory_items_project_status ON memory_items(project_id, status);
        CREATE INDEX idx_memory_items_type ON memory_items(type);

        CREATE TABLE context_modules (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            selectors_json TEXT,
            priority INTEGER NOT NULL DEFAULT 5,
            content_hash TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (project_id, name)
        );

        CREATE TABLE module_memory_items (
            module_id TEXT NOT NULL REFERENCES context_modules(id) ON DELETE CASCADE,
            memory_id TEXT NOT NULL REFERENCES memory_items(id) ON DELETE CASCADE,
            ordering INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (module_id, memory_id)
        );

        CREATE INDEX idx_module_memory_items_memory_id ON module_memory_items(memory_id);",
    )?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS module_memory_items;
         DROP TABLE IF EXISTS context_modules;
         DROP TABLE IF EXISTS memory_items;",
    )?;
    Ok(())
}
