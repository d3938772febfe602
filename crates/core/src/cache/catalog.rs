//! Marketplace sources and detected catalog entries.
//!
//! Entry ids are content addressed from `source_id` and the entry path, so
//! re-scanning a source updates rows in place. Search goes through the
//! `catalog_fts` index and falls back to `LIKE` matching when the SQLite
//! build has no FTS5.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::artifacts::split_tags;
use super::connection::CacheDb;
use super::hash::compute_catalog_entry_id;
use super::migrations::rebuild::table_exists;
use crate::Error;
use crate::types::{ArtifactType, CatalogStatus, TrustLevel};

/// A GitHub repository scanned for artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSource {
    pub id: String,
    pub repo_url: String,
    pub owner: String,
    pub repo_name: String,
    pub ref_name: String,
    pub trust_level: TrustLevel,
    pub last_sync_at: Option<String>,
    pub artifact_count: i64,
}

/// Fields a scanner reports for one detected artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntryInput {
    pub source_id: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub path: String,
    pub upstream_url: Option<String>,
    pub detected_version: Option<String>,
    pub confidence_score: u8,
    pub title: Option<String>,
    pub description: Option<String>,
    pub search_tags: Vec<String>,
    pub deep_search_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub source_id: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub path: String,
    pub upstream_url: Option<String>,
    pub detected_version: Option<String>,
    pub confidence_score: u8,
    pub title: Option<String>,
    pub description: Option<String>,
    pub search_tags: Vec<String>,
    pub status: CatalogStatus,
    pub excluded_at: Option<String>,
    pub excluded_reason: Option<String>,
    pub detected_at: String,
    pub updated_at: String,
}

const ENTRY_COLUMNS: &str = "e.id, e.source_id, e.artifact_type, e.name, e.path, e.upstream_url, e.detected_version, \
     e.confidence_score, e.title, e.description, e.search_tags, e.status, e.excluded_at, e.excluded_reason, \
     e.detected_at, e.updated_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let tags: Option<String> = row.get(10)?;
    Ok(CatalogEntry {
        id: row.get(0)?,
        source_id: row.get(1)?,
        artifact_type: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        upstream_url: row.get(5)?,
        detected_version: row.get(6)?,
        confidence_score: row.get(7)?,
        title: row.get(8)?,
        description: row.get(9)?,
        search_tags: split_tags(tags.as_deref().unwrap_or_default()),
        status: row.get(11)?,
        excluded_at: row.get(12)?,
        excluded_reason: row.get(13)?,
        detected_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn select_entry(conn: &Connection, id: &str) -> Result<Option<CatalogEntry>, Error> {
    let entry = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM marketplace_catalog_entries e WHERE e.id = ?1"),
            params![id],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Split `https://github.com/<owner>/<repo>[.git]` into owner and repo.
pub fn parse_repo_url(repo_url: &str) -> Result<(String, String), Error> {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let path = trimmed.split_once("://").map_or(trimmed, |(_, rest)| rest);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [_host, owner, repo, ..] => Ok(((*owner).to_string(), repo.trim_end_matches(".git").to_string())),
        _ => Err(Error::InvalidInput(format!("not a repository URL: {repo_url}"))),
    }
}

/// FTS5 query matching every whitespace-separated term as a prefix.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn search_fts(conn: &Connection, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM catalog_fts
         JOIN marketplace_catalog_entries e ON e.rowid = catalog_fts.rowid
         WHERE catalog_fts MATCH ?1 AND e.status != 'excluded'
         ORDER BY rank, e.name
         LIMIT ?2"
    ))?;
    let entries = stmt
        .query_map(params![fts_query(query), limit as i64], entry_from_row)?
        .collect::<Result<_, _>>()?;
    Ok(entries)
}

fn search_like(conn: &Connection, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, Error> {
    let pattern = format!("%{}%", query.trim().to_lowercase());
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM marketplace_catalog_entries e
         WHERE e.status != 'excluded' AND (
            lower(e.name) LIKE ?1 OR lower(COALESCE(e.title, '')) LIKE ?1
            OR lower(COALESCE(e.description, '')) LIKE ?1 OR lower(COALESCE(e.search_tags, '')) LIKE ?1
            OR lower(COALESCE(e.deep_search_text, '')) LIKE ?1
         )
         ORDER BY e.confidence_score DESC, e.name
         LIMIT ?2"
    ))?;
    let entries = stmt.query_map(params![pattern, limit as i64], entry_from_row)?.collect::<Result<_, _>>()?;
    Ok(entries)
}

impl CacheDb {
    /// Register a source repository, or update its ref and trust level.
    pub async fn upsert_source(
        &self, repo_url: &str, ref_name: &str, trust_level: TrustLevel,
    ) -> Result<MarketplaceSource, Error> {
        let (owner, repo_name) = parse_repo_url(repo_url)?;
        let repo_url = repo_url.trim().trim_end_matches('/').to_string();
        let ref_name = ref_name.to_string();

        self.conn
            .call(move |conn| -> Result<MarketplaceSource, Error> {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO marketplace_sources (
                        id, repo_url, owner, repo_name, ref, trust_level, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ON CONFLICT(repo_url) DO UPDATE SET
                        ref = excluded.ref,
                        trust_level = excluded.trust_level,
                        updated_at = excluded.updated_at",
                    params![Uuid::new_v4().simple().to_string(), repo_url, owner, repo_name, ref_name, trust_level, now],
                )?;

                let source = conn.query_row(
                    "SELECT id, repo_url, owner, repo_name, ref, trust_level, last_sync_at, artifact_count
                     FROM marketplace_sources WHERE repo_url = ?1",
                    params![repo_url],
                    |row| {
                        Ok(MarketplaceSource {
                            id: row.get(0)?,
                            repo_url: row.get(1)?,
                            owner: row.get(2)?,
                            repo_name: row.get(3)?,
                            ref_name: row.get(4)?,
                            trust_level: row.get(5)?,
                            last_sync_at: row.get(6)?,
                            artifact_count: row.get(7)?,
                        })
                    },
                )?;
                Ok(source)
            })
            .await
            .map_err(Error::from)
    }

    /// Record a detected entry.
    ///
    /// A new entry starts as `new`. A re-detected entry whose version changed
    /// becomes `updated`, unless it was excluded or imported, which sticks.
    pub async fn upsert_catalog_entry(&self, input: &CatalogEntryInput) -> Result<CatalogEntry, Error> {
        if input.confidence_score > 100 {
            return Err(Error::InvalidInput(format!(
                "confidence_score must be 0-100, got {}",
                input.confidence_score
            )));
        }
        let input = input.clone();

        self.conn
            .call(move |conn| -> Result<CatalogEntry, Error> {
                let id = compute_catalog_entry_id(&input.source_id, &input.path);
                let now = Utc::now().to_rfc3339();
                let tags = split_tags(&input.search_tags.join(","));
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT INTO marketplace_catalog_entries (
                        id, source_id, artifact_type, name, path, upstream_url, detected_version,
                        confidence_score, title, description, search_tags, deep_search_text,
                        status, detected_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'new', ?13, ?13)
                    ON CONFLICT(id) DO UPDATE SET
                        artifact_type = excluded.artifact_type,
                        name = excluded.name,
                        upstream_url = excluded.upstream_url,
                        status = CASE
                            WHEN status IN ('excluded', 'imported') THEN status
                            WHEN detected_version IS NOT excluded.detected_version THEN 'updated'
                            ELSE status
                        END,
                        detected_version = excluded.detected_version,
                        confidence_score = excluded.confidence_score,
                        title = excluded.title,
                        description = excluded.description,
                        search_tags = excluded.search_tags,
                        deep_search_text = excluded.deep_search_text,
                        updated_at = excluded.updated_at",
                    params![
                        id,
                        &input.source_id,
                        input.artifact_type,
                        &input.name,
                        &input.path,
                        &input.upstream_url,
                        &input.detected_version,
                        input.confidence_score,
                        &input.title,
                        &input.description,
                        (!tags.is_empty()).then(|| tags.join(",")),
                        &input.deep_search_text,
                        now,
                    ],
                )
                .map_err(|e| {
                    let err = Error::from(e);
                    if err.is_constraint_violation() {
                        Error::NotFound(format!("source {}", input.source_id))
                    } else {
                        err
                    }
                })?;

                tx.execute(
                    "UPDATE marketplace_sources SET
                        artifact_count = (SELECT COUNT(*) FROM marketplace_catalog_entries WHERE source_id = ?1),
                        last_sync_at = ?2
                     WHERE id = ?1",
                    params![&input.source_id, now],
                )?;

                let entry = select_entry(&tx, &id)?.ok_or_else(|| Error::NotFound(format!("catalog entry {id}")))?;
                tx.commit()?;
                Ok(entry)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a catalog entry by id.
    pub async fn get_catalog_entry(&self, id: &str) -> Result<Option<CatalogEntry>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CatalogEntry>, Error> { select_entry(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// Hide an entry from imports and search.
    pub async fn exclude_catalog_entry(&self, id: &str, reason: Option<&str>) -> Result<CatalogEntry, Error> {
        let id = id.to_string();
        let reason = reason.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<CatalogEntry, Error> {
                let now = Utc::now().to_rfc3339();
                let updated = conn.execute(
                    "UPDATE marketplace_catalog_entries
                     SET status = 'excluded', excluded_at = ?1, excluded_reason = ?2, updated_at = ?1
                     WHERE id = ?3",
                    params![now, reason, id],
                )?;
                if updated == 0 {
                    return Err(Error::NotFound(format!("catalog entry {id}")));
                }
                tracing::info!(entry = %id, reason = ?reason, "excluded catalog entry");
                select_entry(conn, &id)?.ok_or_else(|| Error::NotFound(format!("catalog entry {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Undo an exclusion; the entry goes back to `new`.
    pub async fn restore_catalog_entry(&self, id: &str) -> Result<CatalogEntry, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<CatalogEntry, Error> {
                let updated = conn.execute(
                    "UPDATE marketplace_catalog_entries
                     SET status = 'new', excluded_at = NULL, excluded_reason = NULL, updated_at = ?1
                     WHERE id = ?2 AND status = 'excluded'",
                    params![Utc::now().to_rfc3339(), id],
                )?;
                let entry = select_entry(conn, &id)?.ok_or_else(|| Error::NotFound(format!("catalog entry {id}")))?;
                if updated == 0 {
                    tracing::debug!(entry = %id, status = %entry.status, "entry was not excluded");
                }
                Ok(entry)
            })
            .await
            .map_err(Error::from)
    }

    /// Entries of one source, optionally filtered by status.
    pub async fn list_catalog_entries(
        &self, source_id: &str, status: Option<CatalogStatus>,
    ) -> Result<Vec<CatalogEntry>, Error> {
        let source_id = source_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CatalogEntry>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM marketplace_catalog_entries e
                     WHERE e.source_id = ?1 AND (?2 IS NULL OR e.status = ?2)
                     ORDER BY e.path"
                ))?;
                let entries = stmt.query_map(params![source_id, status], entry_from_row)?.collect::<Result<_, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Full-text search over non-excluded entries.
    ///
    /// Uses FTS5 when the index exists and `LIKE` otherwise. An empty query
    /// returns nothing.
    pub async fn search_catalog(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, Error> {
        let query = query.trim().to_string();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        self.conn
            .call(move |conn| -> Result<Vec<CatalogEntry>, Error> {
                if table_exists(conn, "catalog_fts")? {
                    search_fts(conn, &query, limit)
                } else {
                    tracing::debug!("catalog_fts missing; using LIKE search");
                    search_like(conn, &query, limit)
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::migrations::steps::CATALOG_FTS_DEEP;

    fn entry(source_id: &str, name: &str, title: &str) -> CatalogEntryInput {
        CatalogEntryInput {
            source_id: source_id.to_string(),
            artifact_type: ArtifactType::Skill,
            name: name.to_string(),
            path: format!("skills/{name}"),
            upstream_url: None,
            detected_version: Some("1.0.0".into()),
            confidence_score: 80,
            title: Some(title.to_string()),
            description: None,
            search_tags: vec!["design".into()],
            deep_search_text: None,
        }
    }

    async fn fixture() -> (CacheDb, MarketplaceSource) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let source = db.upsert_source("https://github.com/acme/skills.git", "main", TrustLevel::Verified).await.unwrap();
        (db, source)
    }

    #[test]
    fn test_parse_repo_url() {
        assert_eq!(
            parse_repo_url("https://github.com/acme/skills.git/").unwrap(),
            ("acme".to_string(), "skills".to_string())
        );
        assert!(parse_repo_url("https://github.com/acme").is_err());
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("pdf  merge"), "\"pdf\"* \"merge\"*");
        assert_eq!(fts_query("say \"hi\""), "\"say\"* \"\"\"hi\"\"\"*");
    }

    #[tokio::test]
    async fn test_upsert_tracks_status() {
        let (db, source) = fixture().await;
        let mut input = entry(&source.id, "canvas", "Canvas Design");
        let first = db.upsert_catalog_entry(&input).await.unwrap();
        assert_eq!(first.status, CatalogStatus::New);
        assert_eq!(first.id, compute_catalog_entry_id(&source.id, "skills/canvas"));

        let same = db.upsert_catalog_entry(&input).await.unwrap();
        assert_eq!(same.status, CatalogStatus::New);

        input.detected_version = Some("1.1.0".into());
        let bumped = db.upsert_catalog_entry(&input).await.unwrap();
        assert_eq!(bumped.status, CatalogStatus::Updated);

        db.exclude_catalog_entry(&bumped.id, Some("duplicate")).await.unwrap();
        input.detected_version = Some("1.2.0".into());
        let still = db.upsert_catalog_entry(&input).await.unwrap();
        assert_eq!(still.status, CatalogStatus::Excluded);

        let source = db.upsert_source(&source.repo_url, "main", TrustLevel::Verified).await.unwrap();
        assert_eq!(source.artifact_count, 1);
    }

    #[tokio::test]
    async fn test_exclude_and_restore() {
        let (db, source) = fixture().await;
        let created = db.upsert_catalog_entry(&entry(&source.id, "canvas", "Canvas Design")).await.unwrap();

        let excluded = db.exclude_catalog_entry(&created.id, Some("not a skill")).await.unwrap();
        assert_eq!(excluded.status, CatalogStatus::Excluded);
        assert_eq!(excluded.excluded_reason.as_deref(), Some("not a skill"));
        assert!(excluded.excluded_at.is_some());
        assert!(db.search_catalog("canvas", 10).await.unwrap().is_empty());

        let restored = db.restore_catalog_entry(&created.id).await.unwrap();
        assert_eq!(restored.status, CatalogStatus::New);
        assert!(restored.excluded_at.is_none());
        assert_eq!(db.search_catalog("canvas", 10).await.unwrap().len(), 1);

        let err = db.exclude_catalog_entry("missing", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_uses_fts() {
        let (db, source) = fixture().await;
        db.upsert_catalog_entry(&entry(&source.id, "canvas", "Canvas Design")).await.unwrap();
        let mut pdf = entry(&source.id, "pdf", "PDF Tools");
        pdf.deep_search_text = Some("merge split watermark".into());
        db.upsert_catalog_entry(&pdf).await.unwrap();

        let hits = db.search_catalog("waterm", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "pdf");
        assert_eq!(db.search_catalog("design", 10).await.unwrap().len(), 2);
        assert_eq!(db.search_catalog("design", 1).await.unwrap().len(), 1);
        assert!(db.search_catalog("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_falls_back_to_like() {
        let (db, source) = fixture().await;
        db.upsert_catalog_entry(&entry(&source.id, "canvas", "Canvas Design")).await.unwrap();
        db.conn.call(|conn| -> Result<(), Error> { CATALOG_FTS_DEEP.drop(conn) }).await.unwrap();

        let hits = db.search_catalog("CANVAS", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("Canvas Design"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_not_found() {
        let (db, _) = fixture().await;
        let err = db.upsert_catalog_entry(&entry("missing", "x", "X")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mut bad = entry("missing", "x", "X");
        bad.confidence_score = 101;
        assert!(matches!(db.upsert_catalog_entry(&bad).await.unwrap_err(), Error::InvalidInput(_)));
    }
}
