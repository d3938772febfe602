//! The SkillMeat cache revision chain.
//!
//! Step modules hold frozen snapshots of the DDL they create so that later
//! downgrades can rebuild a table into exactly the shape an earlier revision
//! left behind.

use super::Migration;
use super::fts::FtsIndex;

mod m0001_initial_schema;
mod m0002_collections;
mod m0003_marketplace_catalog;
mod m0004_catalog_fts;
mod m0005_artifact_uuid;
mod m0006_composite_artifacts;
mod m0007_collection_artifacts_uuid;
mod m0008_repair_collection_artifacts_pk;
mod m0009_catalog_excluded_status;
mod m0010_catalog_deep_search;
mod m0011_deployment_profiles;
mod m0012_memory_items;
mod m0013_normalize_tags;

/// Catalog full-text index as created by 0004.
pub(crate) const CATALOG_FTS: FtsIndex<'static> = FtsIndex {
    table: "catalog_fts",
    content_table: "marketplace_catalog_entries",
    columns: &["name", "title", "description", "search_tags"],
};

/// Catalog full-text index from 0010 on.
pub(crate) const CATALOG_FTS_DEEP: FtsIndex<'static> = FtsIndex {
    table: "catalog_fts",
    content_table: "marketplace_catalog_entries",
    columns: &["name", "title", "description", "search_tags", "deep_search_text"],
};

pub(crate) static MIGRATIONS: &[Migration] = &[
    Migration {
        revision: "0001_initial_schema",
        down_revision: None,
        description: "projects, artifacts and cache metadata",
        upgrade: m0001_initial_schema::upgrade,
        downgrade: m0001_initial_schema::downgrade,
    },
    Migration {
        revision: "0002_collections",
        down_revision: Some("0001_initial_schema"),
        description: "collections, groups and collection membership",
        upgrade: m0002_collections::upgrade,
        downgrade: m0002_collections::downgrade,
    },
    Migration {
        revision: "0003_marketplace_catalog",
        down_revision: Some("0002_collections"),
        description: "marketplace sources and catalog entries",
        upgrade: m0003_marketplace_catalog::upgrade,
        downgrade: m0003_marketplace_catalog::downgrade,
    },
    Migration {
        revision: "0004_catalog_fts",
        down_revision: Some("0003_marketplace_catalog"),
        description: "full-text index over catalog entries",
        upgrade: m0004_catalog_fts::upgrade,
        downgrade: m0004_catalog_fts::downgrade,
    },
    Migration {
        revision: "0005_artifact_uuid",
        down_revision: Some("0004_catalog_fts"),
        description: "stable artifact uuid",
        upgrade: m0005_artifact_uuid::upgrade,
        downgrade: m0005_artifact_uuid::downgrade,
    },
    Migration {
        revision: "0006_composite_artifacts",
        down_revision: Some("0005_artifact_uuid"),
        description: "composite artifacts and memberships",
        upgrade: m0006_composite_artifacts::upgrade,
        downgrade: m0006_composite_artifacts::downgrade,
    },
    Migration {
        revision: "0007_collection_artifacts_uuid",
        down_revision: Some("0006_composite_artifacts"),
        description: "collection membership keyed by artifact uuid",
        upgrade: m0007_collection_artifacts_uuid::upgrade,
        downgrade: m0007_collection_artifacts_uuid::downgrade,
    },
    Migration {
        revision: "0008_repair_collection_artifacts_pk",
        down_revision: Some("0007_collection_artifacts_uuid"),
        description: "repair collection_artifacts primary key",
        upgrade: m0008_repair_collection_artifacts_pk::upgrade,
        downgrade: m0008_repair_collection_artifacts_pk::downgrade,
    },
    Migration {
        revision: "0009_catalog_excluded_status",
        down_revision: Some("0008_repair_collection_artifacts_pk"),
        description: "catalog entries can be excluded",
        upgrade: m0009_catalog_excluded_status::upgrade,
        downgrade: m0009_catalog_excluded_status::downgrade,
    },
    Migration {
        revision: "0010_catalog_deep_search",
        down_revision: Some("0009_catalog_excluded_status"),
        description: "deep search text in catalog index",
        upgrade: m0010_catalog_deep_search::upgrade,
        downgrade: m0010_catalog_deep_search::downgrade,
    },
    Migration {
        revision: "0011_deployment_profiles",
        down_revision: Some("0010_catalog_deep_search"),
        description: "per-project deployment profiles",
        upgrade: m0011_deployment_profiles::upgrade,
        downgrade: m0011_deployment_profiles::downgrade,
    },
    Migration {
        revision: "0012_memory_items",
        down_revision: Some("0011_deployment_profiles"),
        description: "memory items and context modules",
        upgrade: m0012_memory_items::upgrade,
        downgrade: m0012_memory_items::downgrade,
    },
    Migration {
        revision: "0013_normalize_tags",
        down_revision: Some("0012_memory_items"),
        description: "normalized tag dimension",
        upgrade: m0013_normalize_tags::upgrade,
        downgrade: m0013_normalize_tags::downgrade,
    },
];

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio_rusqlite::rusqlite::types::Value;
    use tokio_rusqlite::rusqlite::{self, Connection};

    use crate::Error;
    use crate::cache::metadata::schema_version;
    use crate::cache::migrations::rebuild::{column_exists, primary_key_columns, table_exists};
    use crate::cache::migrations::{MigrationChain, Target, downgrade_sync, upgrade_sync};

    fn upgrade_to(conn: &mut Connection, target: Target) {
        let chain = MigrationChain::builtin().unwrap();
        upgrade_sync(conn, &chain, &target).unwrap();
    }

    fn downgrade_to(conn: &mut Connection, target: Target) {
        let chain = MigrationChain::builtin().unwrap();
        downgrade_sync(conn, &chain, &target).unwrap();
    }

    fn rev(id: &str) -> Target {
        Target::Revision(id.to_string())
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn catalog_matches(conn: &Connection, query: &str) -> Vec<String> {
        conn.prepare(
            "SELECT e.id FROM catalog_fts f JOIN marketplace_catalog_entries e ON e.rowid = f.rowid
             WHERE catalog_fts MATCH ?1 ORDER BY e.id",
        )
        .unwrap()
        .query_map([query], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
    }

    /// Row sources compared across a downgrade and re-upgrade.
    const ROUND_TRIP_SOURCES: &[(&str, &str)] = &[
        ("artifacts", "SELECT * FROM artifacts"),
        ("collection_artifacts", "SELECT * FROM collection_artifacts"),
        ("marketplace_catalog_entries", "SELECT * FROM marketplace_catalog_entries"),
        ("artifact_tags", "SELECT at.artifact_uuid, t.slug FROM artifact_tags at JOIN tags t ON t.id = at.tag_id"),
    ];

    type Snapshot = Vec<(&'static str, Vec<Vec<(String, Value)>>)>;

    /// Every column of every row, sorted. Artifact uuids are replaced by the
    /// id of the artifact that owns them, since a downgrade below 0005 drops
    /// the uuid and the re-upgrade mints a new one.
    fn snapshot(conn: &Connection) -> Snapshot {
        let owners: HashMap<String, String> = if column_exists(conn, "artifacts", "uuid").unwrap() {
            conn.prepare("SELECT uuid, id FROM artifacts WHERE uuid IS NOT NULL")
                .unwrap()
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        } else {
            HashMap::new()
        };

        let mut snapshot = Vec::new();
        for &(table, sql) in ROUND_TRIP_SOURCES {
            if !table_exists(conn, table).unwrap() {
                continue;
            }
            let mut stmt = conn.prepare(sql).unwrap();
            let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
            let mut rows: Vec<Vec<(String, Value)>> = stmt
                .query_map([], |row| {
                    let mut cells = names
                        .iter()
                        .enumerate()
                        .map(|(idx, name)| {
                            let value = match row.get::<_, Value>(idx)? {
                                Value::Text(text) => match owners.get(&text) {
                                    Some(id) => Value::Text(format!("uuid of {id}")),
                                    None => Value::Text(text),
                                },
                                other => other,
                            };
                            Ok((name.clone(), value))
                        })
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    cells.sort_by(|a, b| a.0.cmp(&b.0));
                    Ok(cells)
                })
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            rows.sort_by_key(|row| format!("{row:?}"));
            snapshot.push((table, rows));
        }
        snapshot
    }

    fn insert_excluded_entry(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO marketplace_catalog_entries (id, source_id, artifact_type, name, path, status, detected_at, updated_at)
             VALUES (?1, 's1', 'skill', ?1, 'skills/' || ?1, 'excluded', 't', 't')",
            [id],
        )
    }

    /// Database at 0004 with one orphaned collection membership.
    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        upgrade_to(&mut conn, rev("0004_catalog_fts"));
        conn.execute_batch(
            "INSERT INTO projects (id, name, path, created_at, updated_at)
                VALUES ('p1', 'demo', '/tmp/demo', 't', 't');
             INSERT INTO artifacts (id, project_id, name, type, tags, created_at, updated_at) VALUES
                ('skill:canvas', 'p1', 'canvas', 'skill', 'Design, canvas ,design', 't', 't'),
                ('command:lint', 'p1', 'lint', 'command', NULL, 't', 't');
             INSERT INTO collections (id, name, created_at, updated_at) VALUES ('c1', 'default', 't', 't');
             INSERT INTO collection_artifacts VALUES
                ('c1', 'skill:canvas', '2024-01-01'),
                ('c1', 'agent:ghost', '2024-01-02');
             INSERT INTO marketplace_sources (id, repo_url, owner, repo_name, created_at, updated_at)
                VALUES ('s1', 'https://github.com/acme/skills', 'acme', 'skills', 't', 't');
             INSERT INTO marketplace_catalog_entries
                (id, source_id, artifact_type, name, path, title, description, status, detected_at, updated_at)
                VALUES ('e1', 's1', 'skill', 'canvas-design', 'skills/canvas', 'Canvas Design', 'Draw posters', 'new', 't', 't');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_fresh_upgrade_reaches_head_shape() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        upgrade_to(&mut conn, Target::Head);

        for table in [
            "projects",
            "artifacts",
            "cache_metadata",
            "collections",
            "groups",
            "collection_artifacts",
            "marketplace_sources",
            "marketplace_catalog_entries",
            "catalog_fts",
            "composite_artifacts",
            "composite_memberships",
            "deployment_profiles",
            "memory_items",
            "context_modules",
            "module_memory_items",
            "tags",
            "artifact_tags",
        ] {
            assert!(table_exists(&conn, table).unwrap(), "missing {table}");
        }
        assert_eq!(schema_version(&conn).unwrap().as_deref(), Some("2.2.0"));
        assert_eq!(primary_key_columns(&conn, "collection_artifacts").unwrap(), vec!["collection_id", "artifact_uuid"]);
        assert!(column_exists(&conn, "marketplace_catalog_entries", "deep_search_text").unwrap());
        assert_eq!(count(&conn, "PRAGMA foreign_keys"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE '\\_%\\_staging' ESCAPE '\\'"), 0);
    }

    #[test]
    fn test_upgrade_carries_data_forward() {
        let mut conn = seeded();
        upgrade_to(&mut conn, Target::Head);

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM artifacts WHERE uuid IS NULL"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(DISTINCT uuid) FROM artifacts"), 2);

        let member: String = conn
            .query_row(
                "SELECT a.id FROM collection_artifacts ca JOIN artifacts a ON a.uuid = ca.artifact_uuid",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(member, "skill:canvas");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM collection_artifacts"), 1);

        let slugs: Vec<String> = conn
            .prepare(
                "SELECT t.slug FROM artifact_tags at JOIN tags t ON t.id = at.tag_id
                 JOIN artifacts a ON a.uuid = at.artifact_uuid WHERE a.id = 'skill:canvas' ORDER BY t.slug",
            )
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(slugs, vec!["canvas", "design"]);
        assert_eq!(
            conn.query_row("SELECT tags FROM artifacts WHERE id = 'skill:canvas'", [], |row| row.get::<_, String>(0))
                .unwrap(),
            "Design, canvas ,design"
        );

        assert_eq!(catalog_matches(&conn, "canvas"), vec!["e1"]);
        conn.execute("UPDATE marketplace_catalog_entries SET deep_search_text = 'vector illustration' WHERE id = 'e1'", [])
            .unwrap();
        assert_eq!(catalog_matches(&conn, "illustration"), vec!["e1"]);
    }

    #[test]
    fn test_round_trip_to_0004_and_back() {
        let mut conn = seeded();
        upgrade_to(&mut conn, Target::Head);
        downgrade_to(&mut conn, rev("0004_catalog_fts"));

        assert_eq!(schema_version(&conn).unwrap().as_deref(), Some("1.0.0"));
        assert!(!column_exists(&conn, "artifacts", "uuid").unwrap());
        assert!(!column_exists(&conn, "marketplace_catalog_entries", "excluded_at").unwrap());
        assert!(!table_exists(&conn, "tags").unwrap());
        let member: String =
            conn.query_row("SELECT artifact_id FROM collection_artifacts", [], |row| row.get(0)).unwrap();
        assert_eq!(member, "skill:canvas");
        assert_eq!(catalog_matches(&conn, "posters"), vec!["e1"]);

        upgrade_to(&mut conn, Target::Head);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM artifacts"), 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM collection_artifacts"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM artifact_tags"), 2);
        assert_eq!(catalog_matches(&conn, "canvas"), vec!["e1"]);
    }

    #[test]
    fn test_each_step_round_trips_rows() {
        let mut conn = seeded();
        upgrade_to(&mut conn, Target::Head);
        conn.execute_batch(
            "INSERT INTO artifacts
                (id, uuid, project_id, name, type, source, deployed_version, upstream_version,
                 is_outdated, local_modified, description, tags, created_at, updated_at)
                VALUES ('agent:writer', 'a0c1', 'p1', 'writer', 'agent', 'acme/skills', '1.0.0', '1.2.0',
                        1, 1, 'Drafts docs', 'docs', '2024-05-01', '2024-05-02');
             INSERT INTO tags (id, name, slug, created_at, updated_at) VALUES ('t-docs', 'docs', 'docs', 't', 't');
             INSERT INTO artifact_tags (artifact_uuid, tag_id, created_at) VALUES ('a0c1', 't-docs', 't');
             INSERT INTO collection_artifacts (collection_id, artifact_uuid, added_at) VALUES ('c1', 'a0c1', '2024-05-03');
             INSERT INTO marketplace_catalog_entries
                (id, source_id, artifact_type, name, path, upstream_url, detected_version, confidence_score,
                 title, description, search_tags, status, detected_at, updated_at)
                VALUES ('e2', 's1', 'agent', 'writer', 'agents/writer', 'https://github.com/acme/skills', 'v2', 80,
                        'Writer', 'Writes docs', 'docs,writing', 'updated', '2024-05-04', '2024-05-05');",
        )
        .unwrap();
        let at_head = snapshot(&conn);

        let chain = MigrationChain::builtin().unwrap();
        let steps = chain.steps();
        let first_rebuilt = steps.iter().position(|m| m.revision == "0005_artifact_uuid").unwrap();
        for idx in (first_rebuilt..steps.len()).rev() {
            let (here, below) = (steps[idx].revision, steps[idx - 1].revision);
            let before = snapshot(&conn);
            downgrade_to(&mut conn, rev(below));
            upgrade_to(&mut conn, rev(here));
            assert_eq!(snapshot(&conn), before, "rows changed across {here}");
            downgrade_to(&mut conn, rev(below));
        }

        upgrade_to(&mut conn, Target::Head);
        assert_eq!(snapshot(&conn), at_head);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM collection_artifacts"), 2);
    }

    #[test]
    fn test_excluded_status_check_follows_revision() {
        let mut conn = seeded();
        upgrade_to(&mut conn, rev("0008_repair_collection_artifacts_pk"));
        let err = insert_excluded_entry(&conn, "x1").unwrap_err();
        assert!(Error::from(err).is_constraint_violation());

        upgrade_to(&mut conn, Target::Head);
        insert_excluded_entry(&conn, "x1").unwrap();
        conn.execute(
            "UPDATE marketplace_catalog_entries SET status = 'excluded', excluded_reason = 'duplicate' WHERE id = 'e1'",
            [],
        )
        .unwrap();

        downgrade_to(&mut conn, rev("0008_repair_collection_artifacts_pk"));
        assert_eq!(schema_version(&conn).unwrap().as_deref(), Some("2.0.0"));
        let status: String =
            conn.query_row("SELECT status FROM marketplace_catalog_entries WHERE id = 'e1'", [], |row| row.get(0)).unwrap();
        assert_eq!(status, "new");
        let err = insert_excluded_entry(&conn, "x2").unwrap_err();
        assert!(Error::from(err).is_constraint_violation());

        conn.execute(
            "INSERT INTO marketplace_catalog_entries (id, source_id, artifact_type, name, path, title, detected_at, updated_at)
             VALUES ('e2', 's1', 'command', 'poster', 'commands/poster', 'Poster maker', 't', 't')",
            [],
        )
        .unwrap();
        assert_eq!(catalog_matches(&conn, "maker"), vec!["e2"]);
    }

    #[test]
    fn test_repair_rebuilds_missing_primary_key() {
        let mut conn = Connection::open_in_memory().unwrap();
        upgrade_to(&mut conn, rev("0007_collection_artifacts_uuid"));
        conn.execute_batch(
            "INSERT INTO collections (id, name, created_at, updated_at) VALUES ('c1', 'default', 't', 't');
             DROP TABLE collection_artifacts;
             CREATE TABLE collection_artifacts (collection_id TEXT, artifact_uuid TEXT, added_at TEXT);
             INSERT INTO collection_artifacts VALUES
                ('c1', 'u1', '2024-02-01'),
                ('c1', 'u1', '2024-01-01'),
                ('c1', 'u2', '2024-03-01');",
        )
        .unwrap();

        upgrade_to(&mut conn, rev("0008_repair_collection_artifacts_pk"));

        assert_eq!(primary_key_columns(&conn, "collection_artifacts").unwrap(), vec!["collection_id", "artifact_uuid"]);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM collection_artifacts"), 2);
        let added: String = conn
            .query_row("SELECT added_at FROM collection_artifacts WHERE artifact_uuid = 'u1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(added, "2024-01-01");
    }

    #[test]
    fn test_repair_leaves_correct_table_alone() {
        let mut conn = seeded();
        upgrade_to(&mut conn, rev("0007_collection_artifacts_uuid"));
        let before: String =
            conn.query_row("SELECT sql FROM sqlite_master WHERE name = 'collection_artifacts'", [], |row| row.get(0)).unwrap();

        upgrade_to(&mut conn, rev("0008_repair_collection_artifacts_pk"));
        let after: String =
            conn.query_row("SELECT sql FROM sqlite_master WHERE name = 'collection_artifacts'", [], |row| row.get(0)).unwrap();
        assert_eq!(before, after);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM collection_artifacts"), 1);
    }

    #[test]
    fn test_full_downgrade_empties_schema() {
        let mut conn = seeded();
        upgrade_to(&mut conn, Target::Head);
        downgrade_to(&mut conn, Target::Base);

        let user_tables = count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_migrations'",
        );
        assert_eq!(user_tables, 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM _migrations"), 0);
    }
}
