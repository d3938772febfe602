use tokio_rusqlite::rusqlite::Connection;

use crate::Error;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE deployment_profiles (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            profile_id TEXT NOT NULL,
            platform TEXT NOT NULL
                CHECK (platform IN ('claude_code', 'codex', 'gemini', 'cursor', 'other')),
            root_dir TEXT NOT NULL,
            artifact_path_map TEXT NOT NULL DEFAULT '{}',
            config_filenames TEXT NOT NULL DEFAULT '[]',
            context_prefixes TEXT NOT NULL DEFAULT '[]',
            supported_types TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (project_id, profile_id)
        );

        CREATE INDEX idx_deployment_profiles_project_id ON deployment_profiles(project_id);",
    )?;
    Ok(())
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch("DROP TABLE IF EXISTS deployment_profiles")?;
    Ok(())
}
