//! Project memory items and context modules.
//!
//! Items are deduplicated by the SHA-256 of their content across the whole
//! cache.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::connection::CacheDb;
use super::hash::content_hash;
use crate::Error;
use crate::types::{MemoryStatus, MemoryType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub project_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub confidence: f64,
    pub status: MemoryStatus,
    pub content_hash: String,
    pub access_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deprecated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextModule {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub priority: i64,
}

const MEMORY_COLUMNS: &str = "m.id, m.project_id, m.type, m.content, m.confidence, m.status, m.content_hash, \
     m.access_count, m.created_at, m.updated_at, m.deprecated_at";

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    Ok(MemoryItem {
        id: row.get(0)?,
        project_id: row.get(1)?,
        memory_type: row.get(2)?,
        content: row.get(3)?,
        confidence: row.get(4)?,
        status: row.get(5)?,
        content_hash: row.get(6)?,
        access_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deprecated_at: row.get(10)?,
    })
}

fn select_memory(conn: &Connection, id: &str) -> Result<Option<MemoryItem>, Error> {
    let item = conn
        .query_row(&format!("SELECT {MEMORY_COLUMNS} FROM memory_items m WHERE m.id = ?1"), params![id], memory_from_row)
        .optional()?;
    Ok(item)
}

impl CacheDb {
    /// Record a new memory item as a `candidate`.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if an item with identical content exists,
    /// `Error::InvalidInput` for empty content or a confidence outside 0-1.
    pub async fn create_memory_item(
        &self, project_id: &str, memory_type: MemoryType, content: &str, confidence: f64,
    ) -> Result<MemoryItem, Error> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("memory content must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidInput(format!("confidence must be between 0 and 1, got {confidence}")));
        }

        let project_id = project_id.to_string();
        let content = content.to_string();
        self.conn
            .call(move |conn| -> Result<MemoryItem, Error> {
                let id = Uuid::new_v4().simple().to_string();
                let hash = content_hash(&content);
                let now = Utc::now().to_rfc3339();

                conn.execute(
                    "INSERT INTO memory_items (
                        id, project_id, type, content, confidence, status, content_hash, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![id, project_id, memory_type, content, confidence, MemoryStatus::Candidate, hash, now],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("memory item with hash {hash} already exists")))?;

                select_memory(conn, &id)?.ok_or_else(|| Error::NotFound(format!("memory item {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Memory items of a project, newest first.
    pub async fn list_memory_items(
        &self, project_id: &str, status: Option<MemoryStatus>,
    ) -> Result<Vec<MemoryItem>, Error> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<MemoryItem>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memory_items m
                     WHERE m.project_id = ?1 AND (?2 IS NULL OR m.status = ?2)
                     ORDER BY m.created_at DESC, m.id"
                ))?;
                let items = stmt.query_map(params![project_id, status], memory_from_row)?.collect::<Result<_, _>>()?;
                Ok(items)
            })
            .await
            .map_err(Error::from)
    }

    /// Move an item through its lifecycle; `deprecated` stamps
    /// `deprecated_at`.
    pub async fn set_memory_status(&self, id: &str, status: MemoryStatus) -> Result<MemoryItem, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<MemoryItem, Error> {
                let now = Utc::now().to_rfc3339();
                let deprecated_at = (status == MemoryStatus::Deprecated).then(|| now.clone());
                let updated = conn.execute(
                    "UPDATE memory_items SET status = ?1, deprecated_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![status, deprecated_at, now, id],
                )?;
                if updated == 0 {
                    return Err(Error::NotFound(format!("memory item {id}")));
                }
                select_memory(conn, &id)?.ok_or_else(|| Error::NotFound(format!("memory item {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Create a named context module in a project.
    pub async fn create_context_module(
        &self, project_id: &str, name: &str, description: Option<&str>, priority: i64,
    ) -> Result<ContextModule, Error> {
        let module = ContextModule {
            id: Uuid::new_v4().simple().to_string(),
            project_id: project_id.to_string(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            priority,
        };
        if module.name.is_empty() {
            return Err(Error::InvalidInput("module name must not be empty".into()));
        }

        let row = module.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO context_modules (id, project_id, name, description, priority, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![row.id, row.project_id, row.name, row.description, row.priority, Utc::now().to_rfc3339()],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("context module {} already exists", row.name)))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(module)
    }

    /// Attach a memory item to a module at `ordering`.
    pub async fn add_memory_to_module(&self, module_id: &str, memory_id: &str, ordering: i64) -> Result<(), Error> {
        let module_id = module_id.to_string();
        let memory_id = memory_id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let (module, memory): (bool, bool) = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM context_modules WHERE id = ?1),
                            EXISTS(SELECT 1 FROM memory_items WHERE id = ?2)",
                    params![module_id, memory_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                if !module {
                    return Err(Error::NotFound(format!("context module {module_id}")));
                }
                if !memory {
                    return Err(Error::NotFound(format!("memory item {memory_id}")));
                }

                conn.execute(
                    "INSERT INTO module_memory_items (module_id, memory_id, ordering) VALUES (?1, ?2, ?3)
                     ON CONFLICT(module_id, memory_id) DO UPDATE SET ordering = excluded.ordering",
                    params![module_id, memory_id, ordering],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Items of a module in their configured order.
    pub async fn module_memory_items(&self, module_id: &str) -> Result<Vec<MemoryItem>, Error> {
        let module_id = module_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<MemoryItem>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM module_memory_items mm
                     JOIN memory_items m ON m.id = mm.memory_id
                     WHERE mm.module_id = ?1
                     ORDER BY mm.ordering, m.created_at"
                ))?;
                let items = stmt.query_map(params![module_id], memory_from_row)?.collect::<Result<_, _>>()?;
                Ok(items)
            })
            .await
            .map_err(Error::from)
    }
}
