//! Composite artifacts and their ordered child memberships.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row};

use super::connection::CacheDb;
use crate::Error;
use crate::types::CompositeType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    pub id: String,
    pub collection_id: Option<String>,
    pub composite_type: CompositeType,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One child of a composite, joined with the child's current key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeMember {
    pub composite_id: String,
    pub child_artifact_uuid: String,
    pub child_artifact_id: String,
    pub relationship_type: String,
    pub pinned_version_hash: Option<String>,
    pub position: Option<i64>,
}

fn composite_from_row(row: &Row<'_>) -> rusqlite::Result<Composite> {
    Ok(Composite {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        composite_type: row.get(2)?,
        display_name: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl CacheDb {
    /// Create a composite artifact.
    pub async fn create_composite(
        &self, id: &str, composite_type: CompositeType, display_name: Option<&str>, collection_id: Option<&str>,
    ) -> Result<Composite, Error> {
        let now = Utc::now().to_rfc3339();
        let composite = Composite {
            id: id.to_string(),
            collection_id: collection_id.map(str::to_string),
            composite_type,
            display_name: display_name.map(str::to_string),
            description: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = composite.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO composite_artifacts (
                        id, collection_id, composite_type, display_name, description, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id,
                        row.collection_id,
                        row.composite_type,
                        row.display_name,
                        row.description,
                        row.created_at,
                        row.updated_at
                    ],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("composite {} already exists", row.id)))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(composite)
    }

    /// Get a composite by id.
    pub async fn get_composite(&self, id: &str) -> Result<Option<Composite>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Composite>, Error> {
                let composite = conn
                    .query_row(
                        "SELECT id, collection_id, composite_type, display_name, description, created_at, updated_at
                         FROM composite_artifacts WHERE id = ?1",
                        params![id],
                        composite_from_row,
                    )
                    .optional()?;
                Ok(composite)
            })
            .await
            .map_err(Error::from)
    }

    /// Add or update a child of a composite.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if either the composite or the child artifact does
    /// not exist.
    pub async fn add_member(
        &self, composite_id: &str, child_uuid: &str, pinned_version_hash: Option<&str>, position: Option<i64>,
    ) -> Result<(), Error> {
        let composite_id = composite_id.to_string();
        let child_uuid = child_uuid.to_string();
        let pinned = pinned_version_hash.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let (composite, child): (bool, bool) = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM composite_artifacts WHERE id = ?1),
                            EXISTS(SELECT 1 FROM artifacts WHERE uuid = ?2)",
                    params![composite_id, child_uuid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                if !composite {
                    return Err(Error::NotFound(format!("composite {composite_id}")));
                }
                if !child {
                    return Err(Error::NotFound(format!("artifact uuid {child_uuid}")));
                }

                conn.execute(
                    "INSERT INTO composite_memberships (
                        composite_id, child_artifact_uuid, pinned_version_hash, position, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(composite_id, child_artifact_uuid) DO UPDATE SET
                        pinned_version_hash = excluded.pinned_version_hash,
                        position = excluded.position",
                    params![composite_id, child_uuid, pinned, position, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Children of a composite ordered by position, unpositioned last.
    pub async fn composite_members(&self, composite_id: &str) -> Result<Vec<CompositeMember>, Error> {
        let composite_id = composite_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CompositeMember>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT m.composite_id, m.child_artifact_uuid, a.id, m.relationship_type,
                            m.pinned_version_hash, m.position
                     FROM composite_memberships m
                     JOIN artifacts a ON a.uuid = m.child_artifact_uuid
                     WHERE m.composite_id = ?1
                     ORDER BY m.position IS NULL, m.position, m.created_at, a.id",
                )?;
                let members = stmt
                    .query_map(params![composite_id], |row| {
                        Ok(CompositeMember {
                            composite_id: row.get(0)?,
                            child_artifact_uuid: row.get(1)?,
                            child_artifact_id: row.get(2)?,
                            relationship_type: row.get(3)?,
                            pinned_version_hash: row.get(4)?,
                            position: row.get(5)?,
                        })
                    })?
                    .collect::<Result<_, _>>()?;
                Ok(members)
            })
            .await
            .map_err(Error::from)
    }
}
