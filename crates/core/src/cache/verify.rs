//! Schema verification against the declared head shape.
//!
//! A migration can record itself as applied and still leave a table with the
//! wrong primary key; nothing in SQLite notices until duplicates pile up.
//! [`verify`] compares every table's actual key with [`EXPECTED_PRIMARY_KEYS`]
//! so such drift surfaces in `db check` instead.

use serde::Serialize;
use tokio_rusqlite::rusqlite::Connection;

use super::connection::CacheDb;
use super::metadata::{SCHEMA_VERSION, schema_version};
use super::migrations::rebuild::{primary_key_columns, table_exists};
use super::migrations::{MigrationChain, current_position};
use crate::Error;

/// Primary key of every table at head, in key order.
pub const EXPECTED_PRIMARY_KEYS: &[(&str, &[&str])] = &[
    ("projects", &["id"]),
    ("artifacts", &["id"]),
    ("cache_metadata", &["key"]),
    ("collections", &["id"]),
    ("groups", &["id"]),
    ("collection_artifacts", &["collection_id", "artifact_uuid"]),
    ("marketplace_sources", &["id"]),
    ("marketplace_catalog_entries", &["id"]),
    ("composite_artifacts", &["id"]),
    ("composite_memberships", &["composite_id", "child_artifact_uuid"]),
    ("deployment_profiles", &["id"]),
    ("memory_items", &["id"]),
    ("context_modules", &["id"]),
    ("module_memory_items", &["module_id", "memory_id"]),
    ("tags", &["id"]),
    ("artifact_tags", &["artifact_uuid", "tag_id"]),
];

/// Outcome of [`verify`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub revision: Option<String>,
    pub head: String,
    pub schema_version: Option<String>,
    pub expected_schema_version: String,
    /// Structural problems; any of these fails the check.
    pub findings: Vec<String>,
    /// Mismatches worth a look that do not fail the check.
    pub warnings: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Check revision, primary keys and schema version.
///
/// Primary keys are only compared once the database is at head; an older
/// database is reported as behind instead.
pub fn verify(conn: &Connection) -> Result<VerifyReport, Error> {
    let chain = MigrationChain::builtin()?;
    let position = current_position(conn, &chain)?;
    let mut report = VerifyReport {
        revision: position.map(|idx| chain.steps()[idx].revision.to_string()),
        head: chain.head().to_string(),
        schema_version: schema_version(conn)?,
        expected_schema_version: SCHEMA_VERSION.to_string(),
        ..VerifyReport::default()
    };

    if report.revision.as_deref() != Some(chain.head()) {
        report.findings.push(format!(
            "database is at {}, head is {}",
            report.revision.as_deref().unwrap_or("base"),
            chain.head()
        ));
        return Ok(report);
    }

    for (table, expected) in EXPECTED_PRIMARY_KEYS {
        if !table_exists(conn, table)? {
            report.findings.push(format!("table {table} is missing"));
            continue;
        }
        let actual = primary_key_columns(conn, table)?;
        if actual != *expected {
            report.findings.push(format!(
                "table {table} has primary key ({}), expected ({})",
                actual.join(", "),
                expected.join(", ")
            ));
        }
    }

    if report.schema_version.as_deref() != Some(SCHEMA_VERSION) {
        report.warnings.push(format!(
            "schema_version is {}, expected {SCHEMA_VERSION}",
            report.schema_version.as_deref().unwrap_or("unset")
        ));
    }

    for finding in &report.findings {
        tracing::warn!(finding = %finding, "schema verification");
    }
    Ok(report)
}

impl CacheDb {
    /// Run [`verify`] on this database.
    pub async fn verify(&self) -> Result<VerifyReport, Error> {
        self.conn
            .call(|conn| -> Result<VerifyReport, Error> { verify(conn) })
            .await
            .map_err(Error::from)
    }
}
