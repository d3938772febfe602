//! Normalize the comma-separated `artifacts.tags` text into a tag table.
//!
//! The legacy column stays in place and is not rewritten, so downgrading only
//! drops the new tables.

use std::collections::HashMap;

use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension};
use uuid::Uuid;

use crate::Error;
use crate::cache::metadata::set_schema_version;
use crate::types::slugify;

pub(super) fn upgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE,
            color TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE artifact_tags (
            artifact_uuid TEXT NOT NULL REFERENCES artifacts(uuid) ON DELETE CASCADE,
            tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (artifact_uuid, tag_id)
        );

        CREATE INDEX idx_artifact_tags_tag_id ON artifact_tags(tag_id);",
    )?;

    let (tags, links) = backfill(conn)?;
    tracing::info!(tags, links, "normalized legacy artifact tags");

    set_schema_version(conn, "2.2.0")
}

/// Returns the number of tags created and artifact links written.
fn backfill(conn: &Connection) -> Result<(usize, usize), Error> {
    let rows: Vec<(String, String)> = conn
        .prepare("SELECT uuid, tags FROM artifacts WHERE uuid IS NOT NULL AND tags IS NOT NULL AND tags != ''")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, rusqlite::Error>>()?;

    let now = Utc::now().to_rfc3339();
    let mut by_slug: HashMap<String, String> = HashMap::new();
    let mut created = 0;
    let mut linked = 0;

    for (artifact_uuid, raw) in rows {
        for name in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let slug = slugify(name);
            if slug.is_empty() {
                tracing::debug!(tag = name, "skipping tag with empty slug");
                continue;
            }

            let tag_id = match by_slug.get(&slug) {
                Some(id) => id.clone(),
                None => {
                    let existing: Option<String> = conn
                        .query_row("SELECT id FROM tags WHERE slug = ?1", params![slug], |row| row.get(0))
                        .optional()?;
                    let id = match existing {
                        Some(id) => id,
                        None => {
                            let id = Uuid::new_v4().simple().to_string();
                            conn.execute(
                                "INSERT INTO tags (id, name, slug, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                                params![id, name, slug, now],
                            )?;
                            created += 1;
                            id
                        }
                    };
                    by_slug.insert(slug, id.clone());
                    id
                }
            };

            linked += conn.execute(
                "INSERT OR IGNORE INTO artifact_tags (artifact_uuid, tag_id, created_at) VALUES (?1, ?2, ?3)",
                params![artifact_uuid, tag_id, now],
            )?;
        }
    }

    Ok((created, linked))
}

pub(super) fn downgrade(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS artifact_tags;
         DROP TABLE IF EXISTS tags;",
    )?;
    set_schema_version(conn, "2.1.0")
}
