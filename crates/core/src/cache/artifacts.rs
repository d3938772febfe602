//! Artifact rows and their tags.
//!
//! An artifact has two identities. `id` is the legacy `type:name` key and
//! changes on rename; `uuid` is assigned on first insert and never changes,
//! so collection memberships, composite memberships and tags refer to it.
//!
//! Tags are written twice: to the comma-separated `artifacts.tags` column
//! older readers use, and to the normalized `tags`/`artifact_tags` tables.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::connection::CacheDb;
use crate::Error;
use crate::types::{ArtifactType, slugify};

/// A deployed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub uuid: String,
    pub project_id: String,
    pub name: String,
    pub artifact_type: ArtifactType,
    pub source: Option<String>,
    pub deployed_version: Option<String>,
    pub upstream_version: Option<String>,
    pub is_outdated: bool,
    pub local_modified: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a caller supplies when recording an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInput {
    pub project_id: String,
    pub name: String,
    pub artifact_type: Option<ArtifactType>,
    pub source: Option<String>,
    pub deployed_version: Option<String>,
    pub upstream_version: Option<String>,
    pub local_modified: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ArtifactInput {
    pub fn new(project_id: impl Into<String>, artifact_type: ArtifactType, name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            artifact_type: Some(artifact_type),
            ..Self::default()
        }
    }

    /// Outdated when both versions are known and differ.
    fn is_outdated(&self) -> bool {
        matches!((&self.deployed_version, &self.upstream_version), (Some(d), Some(u)) if d != u)
    }
}

/// A normalized tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
}

pub(crate) const ARTIFACT_COLUMNS: &str = "a.id, a.uuid, a.project_id, a.name, a.type, a.source, a.deployed_version, \
     a.upstream_version, a.is_outdated, a.local_modified, a.description, a.tags, a.created_at, a.updated_at";

pub(crate) fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    let tags: Option<String> = row.get(11)?;
    Ok(Artifact {
        id: row.get(0)?,
        uuid: row.get(1)?,
        project_id: row.get(2)?,
        name: row.get(3)?,
        artifact_type: row.get(4)?,
        source: row.get(5)?,
        deployed_version: row.get(6)?,
        upstream_version: row.get(7)?,
        is_outdated: row.get(8)?,
        local_modified: row.get(9)?,
        description: row.get(10)?,
        tags: split_tags(tags.as_deref().unwrap_or_default()),
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Split legacy comma-separated tags, dropping blanks and repeats.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty() && seen.insert(slugify(t)))
        .map(str::to_string)
        .collect()
}

fn select_artifact(conn: &Connection, filter: &str, value: &str) -> Result<Option<Artifact>, Error> {
    let artifact = conn
        .query_row(
            &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts a WHERE {filter} = ?1"),
            params![value],
            artifact_from_row,
        )
        .optional()?;
    Ok(artifact)
}

/// Replace the normalized tags of one artifact.
fn sync_tags(conn: &Connection, artifact_uuid: &str, tags: &[String], now: &str) -> Result<(), Error> {
    conn.execute("DELETE FROM artifact_tags WHERE artifact_uuid = ?1", params![artifact_uuid])?;

    for name in tags {
        let slug = slugify(name);
        if slug.is_empty() {
            continue;
        }
        let existing: Option<String> = conn
            .query_row("SELECT id FROM tags WHERE slug = ?1", params![slug], |row| row.get(0))
            .optional()?;
        let tag_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().simple().to_string();
                conn.execute(
                    "INSERT INTO tags (id, name, slug, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![id, name, slug, now],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("tag name {name} is taken")))?;
                id
            }
        };
        conn.execute(
            "INSERT OR IGNORE INTO artifact_tags (artifact_uuid, tag_id, created_at) VALUES (?1, ?2, ?3)",
            params![artifact_uuid, tag_id, now],
        )?;
    }
    Ok(())
}

impl CacheDb {
    /// Insert or update an artifact keyed by `type:name`.
    ///
    /// A new row gets a fresh uuid; an existing row keeps its uuid and
    /// `created_at`.
    pub async fn upsert_artifact(&self, input: &ArtifactInput) -> Result<Artifact, Error> {
        let input = input.clone();
        let artifact_type = input
            .artifact_type
            .ok_or_else(|| Error::InvalidInput(format!("artifact {} has no type", input.name)))?;
        if input.name.trim().is_empty() {
            return Err(Error::InvalidInput("artifact name must not be empty".into()));
        }

        self.conn
            .call(move |conn| -> Result<Artifact, Error> {
                let id = artifact_type.key(&input.name);
                let now = Utc::now().to_rfc3339();
                let tags = split_tags(&input.tags.join(","));
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT INTO artifacts (
                        id, uuid, project_id, name, type, source, deployed_version, upstream_version,
                        is_outdated, local_modified, description, tags, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                    ON CONFLICT(id) DO UPDATE SET
                        project_id = excluded.project_id,
                        source = excluded.source,
                        deployed_version = excluded.deployed_version,
                        upstream_version = excluded.upstream_version,
                        is_outdated = excluded.is_outdated,
                        local_modified = excluded.local_modified,
                        description = excluded.description,
                        tags = excluded.tags,
                        updated_at = excluded.updated_at",
                    params![
                        id,
                        Uuid::new_v4().simple().to_string(),
                        &input.project_id,
                        &input.name,
                        artifact_type,
                        &input.source,
                        &input.deployed_version,
                        &input.upstream_version,
                        input.is_outdated(),
                        input.local_modified,
                        &input.description,
                        (!tags.is_empty()).then(|| tags.join(",")),
                        now,
                    ],
                )?;

                let artifact = select_artifact(&tx, "a.id", &id)?
                    .ok_or_else(|| Error::NotFound(format!("artifact {id} vanished during upsert")))?;
                sync_tags(&tx, &artifact.uuid, &tags, &now)?;
                tx.commit()?;

                tracing::debug!(artifact = %artifact.id, uuid = %artifact.uuid, "upserted artifact");
                Ok(artifact)
            })
            .await
            .map_err(Error::from)
    }

    /// Get an artifact by its `type:name` key.
    pub async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Artifact>, Error> { select_artifact(conn, "a.id", &id) })
            .await
            .map_err(Error::from)
    }

    /// Get an artifact by its stable uuid.
    pub async fn get_artifact_by_uuid(&self, uuid: &str) -> Result<Option<Artifact>, Error> {
        let uuid = uuid.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Artifact>, Error> { select_artifact(conn, "a.uuid", &uuid) })
            .await
            .map_err(Error::from)
    }

    /// Artifacts of one project ordered by key.
    pub async fn list_artifacts(&self, project_id: &str) -> Result<Vec<Artifact>, Error> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Artifact>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts a WHERE a.project_id = ?1 ORDER BY a.id"))?;
                let artifacts = stmt.query_map(params![project_id], artifact_from_row)?.collect::<Result<_, _>>()?;
                Ok(artifacts)
            })
            .await
            .map_err(Error::from)
    }

    /// Rename an artifact, changing its `type:name` key but not its uuid.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if `id` does not exist, `Error::Conflict` if the new
    /// key is already taken.
    pub async fn rename_artifact(&self, id: &str, new_name: &str) -> Result<Artifact, Error> {
        let id = id.to_string();
        let new_name = new_name.trim().to_string();
        if new_name.is_empty() {
            return Err(Error::InvalidInput("artifact name must not be empty".into()));
        }

        self.conn
            .call(move |conn| -> Result<Artifact, Error> {
                let current = select_artifact(conn, "a.id", &id)?.ok_or_else(|| Error::NotFound(format!("artifact {id}")))?;
                let new_id = current.artifact_type.key(&new_name);

                conn.execute(
                    "UPDATE artifacts SET id = ?1, name = ?2, updated_at = ?3 WHERE id = ?4",
                    params![new_id, new_name, Utc::now().to_rfc3339(), id],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("artifact {new_id} already exists")))?;

                tracing::info!(from = %id, to = %new_id, uuid = %current.uuid, "renamed artifact");
                select_artifact(conn, "a.id", &new_id)?.ok_or_else(|| Error::NotFound(format!("artifact {new_id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an artifact and every membership that points at it.
    pub async fn delete_artifact(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let uuid: Option<String> = tx
                    .query_row("SELECT uuid FROM artifacts WHERE id = ?1", params![id], |row| row.get(0))
                    .optional()?;
                let Some(uuid) = uuid else {
                    return Ok(false);
                };

                // collection_artifacts has no foreign key on the uuid
                tx.execute("DELETE FROM collection_artifacts WHERE artifact_uuid = ?1", params![uuid])?;
                tx.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Normalized tags of an artifact, by slug.
    pub async fn artifact_tags(&self, artifact_uuid: &str) -> Result<Vec<Tag>, Error> {
        let artifact_uuid = artifact_uuid.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Tag>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT t.id, t.name, t.slug FROM artifact_tags at
                     JOIN tags t ON t.id = at.tag_id
                     WHERE at.artifact_uuid = ?1 ORDER BY t.slug",
                )?;
                let tags = stmt
                    .query_map(params![artifact_uuid], |row| {
                        Ok(Tag { id: row.get(0)?, name: row.get(1)?, slug: row.get(2)? })
                    })?
                    .collect::<Result<_, _>>()?;
                Ok(tags)
            })
            .await
            .map_err(Error::from)
    }
}
