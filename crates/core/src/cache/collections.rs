//! Collections, their groups, and artifact membership by uuid.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row};
use uuid::Uuid;

use super::artifacts::{ARTIFACT_COLUMNS, Artifact, artifact_from_row};
use super::connection::CacheDb;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub collection_id: String,
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl CacheDb {
    /// Create a collection with a generated id.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if the name is taken.
    pub async fn create_collection(&self, name: &str, description: Option<&str>) -> Result<Collection, Error> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("collection name must not be empty".into()));
        }
        let now = Utc::now().to_rfc3339();
        let collection = Collection {
            id: Uuid::new_v4().simple().to_string(),
            name,
            description: description.map(str::to_string),
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = collection.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO collections (id, name, description, created_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.id, row.name, row.description, row.created_by, row.created_at, row.updated_at],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("collection {} already exists", row.name)))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(collection)
    }

    /// Get a collection by id.
    pub async fn get_collection(&self, id: &str) -> Result<Option<Collection>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Collection>, Error> {
                let collection = conn
                    .query_row(
                        "SELECT id, name, description, created_by, created_at, updated_at FROM collections WHERE id = ?1",
                        params![id],
                        collection_from_row,
                    )
                    .optional()?;
                Ok(collection)
            })
            .await
            .map_err(Error::from)
    }

    /// Add a group at the end of a collection.
    pub async fn create_group(
        &self, collection_id: &str, name: &str, description: Option<&str>,
    ) -> Result<Group, Error> {
        let collection_id = collection_id.to_string();
        let name = name.trim().to_string();
        let description = description.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<Group, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM collections WHERE id = ?1)",
                    params![collection_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::NotFound(format!("collection {collection_id}")));
                }

                let position: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM groups WHERE collection_id = ?1",
                    params![collection_id],
                    |row| row.get(0),
                )?;
                let group = Group { id: Uuid::new_v4().simple().to_string(), collection_id, name, description, position };
                let now = Utc::now().to_rfc3339();

                conn.execute(
                    "INSERT INTO groups (id, collection_id, name, description, position, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![group.id, group.collection_id, group.name, group.description, group.position, now],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("group {} already exists", group.name)))?;
                Ok(group)
            })
            .await
            .map_err(Error::from)
    }

    /// Groups of a collection in display order.
    pub async fn groups(&self, collection_id: &str) -> Result<Vec<Group>, Error> {
        let collection_id = collection_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Group>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, collection_id, name, description, position FROM groups
                     WHERE collection_id = ?1 ORDER BY position, name",
                )?;
                let groups = stmt
                    .query_map(params![collection_id], |row| {
                        Ok(Group {
                            id: row.get(0)?,
                            collection_id: row.get(1)?,
                            name: row.get(2)?,
                            description: row.get(3)?,
                            position: row.get(4)?,
                        })
                    })?
                    .collect::<Result<_, _>>()?;
                Ok(groups)
            })
            .await
            .map_err(Error::from)
    }

    /// Add an artifact to a collection; adding it twice is a no-op.
    ///
    /// Returns true if a membership was created.
    pub async fn add_to_collection(&self, collection_id: &str, artifact_uuid: &str) -> Result<bool, Error> {
        let collection_id = collection_id.to_string();
        let artifact_uuid = artifact_uuid.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let artifact: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM artifacts WHERE uuid = ?1)",
                    params![artifact_uuid],
                    |row| row.get(0),
                )?;
                if !artifact {
                    return Err(Error::NotFound(format!("artifact uuid {artifact_uuid}")));
                }

                let inserted = conn
                    .execute(
                        "INSERT OR IGNORE INTO collection_artifacts (collection_id, artifact_uuid, added_at)
                         VALUES (?1, ?2, ?3)",
                        params![collection_id, artifact_uuid, Utc::now().to_rfc3339()],
                    )
                    .map_err(|e| {
                        let err = Error::from(e);
                        if err.is_constraint_violation() {
                            Error::NotFound(format!("collection {collection_id}"))
                        } else {
                            err
                        }
                    })?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an artifact from a collection.
    pub async fn remove_from_collection(&self, collection_id: &str, artifact_uuid: &str) -> Result<bool, Error> {
        let collection_id = collection_id.to_string();
        let artifact_uuid = artifact_uuid.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute(
                    "DELETE FROM collection_artifacts WHERE collection_id = ?1 AND artifact_uuid = ?2",
                    params![collection_id, artifact_uuid],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Artifacts in a collection, oldest membership first.
    pub async fn collection_artifacts(&self, collection_id: &str) -> Result<Vec<Artifact>, Error> {
        let collection_id = collection_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Artifact>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTIFACT_COLUMNS} FROM collection_artifacts ca
                     JOIN artifacts a ON a.uuid = ca.artifact_uuid
                     WHERE ca.collection_id = ?1
                     ORDER BY ca.added_at, a.id"
                ))?;
                let artifacts = stmt.query_map(params![collection_id], artifact_from_row)?.collect::<Result<_, _>>()?;
                Ok(artifacts)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a collection with its groups and memberships.
    pub async fn delete_collection(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
