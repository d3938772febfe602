//! Project rows.
//!
//! Deleting a project cascades to its artifacts, deployment profiles and
//! memory items through foreign keys.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row};

use super::connection::CacheDb;
use crate::Error;
use crate::types::ProjectStatus;

/// A tracked project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub last_fetched: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    /// Active project with fresh timestamps.
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            description: None,
            status: ProjectStatus::Active,
            last_fetched: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, path, description, status, last_fetched, error_message, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        last_fetched: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl CacheDb {
    /// Insert a project or update every mutable field of an existing one.
    ///
    /// `created_at` of an existing row is kept.
    pub async fn upsert_project(&self, project: &Project) -> Result<(), Error> {
        let project = project.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO projects (
                        id, name, path, description, status, last_fetched, error_message, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        path = excluded.path,
                        description = excluded.description,
                        status = excluded.status,
                        last_fetched = excluded.last_fetched,
                        error_message = excluded.error_message,
                        updated_at = excluded.updated_at",
                    params![
                        &project.id,
                        &project.name,
                        &project.path,
                        &project.description,
                        project.status,
                        &project.last_fetched,
                        &project.error_message,
                        &project.created_at,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .map_err(|e| Error::from(e).or_conflict(format!("project path {} already tracked", project.path)))?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a project by id.
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Project>, Error> {
                let project = conn
                    .query_row(
                        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                        params![id],
                        project_from_row,
                    )
                    .optional()?;
                Ok(project)
            })
            .await
            .map_err(Error::from)
    }

    /// All projects ordered by name.
    pub async fn list_projects(&self) -> Result<Vec<Project>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Project>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name"))?;
                let projects = stmt.query_map([], project_from_row)?.collect::<Result<_, _>>()?;
                Ok(projects)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a project and everything that cascades from it, plus the
    /// collection memberships of its artifacts.
    ///
    /// Returns false if no such project existed.
    pub async fn delete_project(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                // collection_artifacts has no foreign key on the uuid
                tx.execute(
                    "DELETE FROM collection_artifacts
                     WHERE artifact_uuid IN (SELECT uuid FROM artifacts WHERE project_id = ?1)",
                    params![id],
                )?;
                let deleted = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
                tx.commit()?;
                if deleted > 0 {
                    tracing::info!(project = %id, "deleted project");
                }
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::artifacts::ArtifactInput;
    use crate::types::ArtifactType;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut project = Project::new("p1", "demo", "/work/demo");
        db.upsert_project(&project).await.unwrap();

        project.status = ProjectStatus::Stale;
        project.description = Some("renamed".into());
        db.upsert_project(&project).await.unwrap();

        let stored = db.get_project("p1").await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Stale);
        assert_eq!(stored.description.as_deref(), Some("renamed"));
        assert_eq!(db.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_path_conflicts() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_project(&Project::new("p1", "a", "/same")).await.unwrap();
        let err = db.upsert_project(&Project::new("p2", "b", "/same")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_clears_collection_membership() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_project(&Project::new("p1", "demo", "/work/demo")).await.unwrap();
        db.upsert_project(&Project::new("p2", "other", "/work/other")).await.unwrap();
        let gone = db.upsert_artifact(&ArtifactInput::new("p1", ArtifactType::Skill, "canvas")).await.unwrap();
        let kept = db.upsert_artifact(&ArtifactInput::new("p2", ArtifactType::Skill, "poster")).await.unwrap();
        let collection = db.create_collection("default", None).await.unwrap();
        db.add_to_collection(&collection.id, &gone.uuid).await.unwrap();
        db.add_to_collection(&collection.id, &kept.uuid).await.unwrap();

        assert!(db.delete_project("p1").await.unwrap());

        let rows: Vec<String> = db
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT artifact_uuid FROM collection_artifacts")?;
                let rows = stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap();
        assert_eq!(rows, vec![kept.uuid]);
        assert!(db.get_artifact(&gone.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_project() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.delete_project("nope").await.unwrap());
        assert!(db.get_project("nope").await.unwrap().is_none());
    }
}
