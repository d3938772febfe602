//! Per-project deployment profiles.
//!
//! The list and map fields are stored as JSON text.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Row};
use uuid::Uuid;

use super::connection::CacheDb;
use crate::Error;
use crate::types::{ArtifactType, Platform};

/// Where and how artifacts of a project are deployed for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProfile {
    pub project_id: String,
    pub profile_id: String,
    pub platform: Platform,
    pub root_dir: String,
    #[serde(default)]
    pub artifact_path_map: BTreeMap<String, String>,
    #[serde(default)]
    pub config_filenames: Vec<String>,
    #[serde(default)]
    pub context_prefixes: Vec<String>,
    #[serde(default)]
    pub supported_types: Vec<ArtifactType>,
}

struct ProfileRow {
    project_id: String,
    profile_id: String,
    platform: Platform,
    root_dir: String,
    artifact_path_map: String,
    config_filenames: String,
    context_prefixes: String,
    supported_types: String,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: row.get(0)?,
            profile_id: row.get(1)?,
            platform: row.get(2)?,
            root_dir: row.get(3)?,
            artifact_path_map: row.get(4)?,
            config_filenames: row.get(5)?,
            context_prefixes: row.get(6)?,
            supported_types: row.get(7)?,
        })
    }

    fn decode(self) -> Result<DeploymentProfile, Error> {
        Ok(DeploymentProfile {
            project_id: self.project_id,
            profile_id: self.profile_id,
            platform: self.platform,
            root_dir: self.root_dir,
            artifact_path_map: serde_json::from_str(&self.artifact_path_map)?,
            config_filenames: serde_json::from_str(&self.config_filenames)?,
            context_prefixes: serde_json::from_str(&self.context_prefixes)?,
            supported_types: serde_json::from_str(&self.supported_types)?,
        })
    }
}

impl CacheDb {
    /// Insert or replace the profile `(project_id, profile_id)`.
    pub async fn upsert_deployment_profile(&self, profile: &DeploymentProfile) -> Result<(), Error> {
        if profile.profile_id.trim().is_empty() {
            return Err(Error::InvalidInput("profile_id must not be empty".into()));
        }
        let path_map = serde_json::to_string(&profile.artifact_path_map)?;
        let config_filenames = serde_json::to_string(&profile.config_filenames)?;
        let context_prefixes = serde_json::to_string(&profile.context_prefixes)?;
        let supported_types = serde_json::to_string(&profile.supported_types)?;
        let profile = profile.clone();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO deployment_profiles (
                        id, project_id, profile_id, platform, root_dir, artifact_path_map,
                        config_filenames, context_prefixes, supported_types, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                    ON CONFLICT(project_id, profile_id) DO UPDATE SET
                        platform = excluded.platform,
                        root_dir = excluded.root_dir,
                        artifact_path_map = excluded.artifact_path_map,
                        config_filenames = excluded.config_filenames,
                        context_prefixes = excluded.context_prefixes,
                        supported_types = excluded.supported_types,
                        updated_at = excluded.updated_at",
                    params![
                        Uuid::new_v4().simple().to_string(),
                        profile.project_id,
                        profile.profile_id,
                        profile.platform,
                        profile.root_dir,
                        path_map,
                        config_filenames,
                        context_prefixes,
                        supported_types,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .map_err(|e| {
                    let err = Error::from(e);
                    if err.is_constraint_violation() {
                        Error::NotFound(format!("project {}", profile.project_id))
                    } else {
                        err
                    }
                })?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Profiles of a project ordered by profile id.
    pub async fn deployment_profiles(&self, project_id: &str) -> Result<Vec<DeploymentProfile>, Error> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<DeploymentProfile>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT project_id, profile_id, platform, root_dir, artifact_path_map,
                            config_filenames, context_prefixes, supported_types
                     FROM deployment_profiles WHERE project_id = ?1 ORDER BY profile_id",
                )?;
                let rows: Vec<ProfileRow> =
                    stmt.query_map(params![project_id], ProfileRow::from_row)?.collect::<Result<_, _>>()?;
                rows.into_iter().map(ProfileRow::decode).collect()
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::projects::Project;

    fn profile(profile_id: &str, platform: Platform) -> DeploymentProfile {
        DeploymentProfile {
            project_id: "p1".into(),
            profile_id: profile_id.into(),
            platform,
            root_dir: ".claude".into(),
            artifact_path_map: BTreeMap::from([("skill".to_string(), "skills".to_string())]),
            config_filenames: vec!["CLAUDE.md".into()],
            context_prefixes: vec![],
            supported_types: vec![ArtifactType::Skill, ArtifactType::Agent],
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_profile_id() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_project(&Project::new("p1", "demo", "/work/demo")).await.unwrap();

        db.upsert_deployment_profile(&profile("default", Platform::ClaudeCode)).await.unwrap();
        let mut codex = profile("codex", Platform::Codex);
        codex.root_dir = ".codex".into();
        db.upsert_deployment_profile(&codex).await.unwrap();
        codex.root_dir = ".agents".into();
        db.upsert_deployment_profile(&codex).await.unwrap();

        let profiles = db.deployment_profiles("p1").await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].profile_id, "codex");
        assert_eq!(profiles[0].root_dir, ".agents");
        assert_eq!(profiles[1].supported_types, vec![ArtifactType::Skill, ArtifactType::Agent]);
        assert_eq!(profiles[1].artifact_path_map.get("skill").map(String::as_str), Some("skills"));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let err = db.upsert_deployment_profile(&profile("default", Platform::Cursor)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
