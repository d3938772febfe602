//! Database schema migrations.
//!
//! Migrations form a linked chain: every step names its predecessor through
//! `down_revision`, and exactly one root has none. The `_migrations` table
//! records which revisions are applied; the applied set must always be a
//! prefix of the chain, and the last member of that prefix is the current
//! revision.
//!
//! Each step is an `upgrade`/`downgrade` pair run inside its own transaction
//! together with the bookkeeping write, so a failing step rolls back on its
//! own and leaves earlier steps committed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;
use tokio_rusqlite::rusqlite::{self, Connection};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use crate::Error;

pub mod fts;
pub mod rebuild;
pub(crate) mod steps;

/// Signature shared by every upgrade and downgrade function.
pub type StepFn = fn(&Connection) -> Result<(), Error>;

/// One node in the revision chain.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub revision: &'static str,
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    pub upgrade: StepFn,
    pub downgrade: StepFn,
}

/// Where an upgrade or downgrade should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Latest revision in the chain.
    Head,
    /// Empty database, before the root.
    Base,
    /// A specific revision.
    Revision(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(Error::InvalidInput("empty migration target".into())),
            "head" => Ok(Target::Head),
            "base" => Ok(Target::Base),
            other => Ok(Target::Revision(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("upgrade"),
            Direction::Down => f.write_str("downgrade"),
        }
    }
}

/// Chain entry annotated with its applied state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub revision: String,
    pub down_revision: Option<String>,
    pub description: String,
    pub applied: bool,
    pub current: bool,
}

/// Validated, root-to-head ordered list of migrations.
#[derive(Debug, Clone)]
pub struct MigrationChain {
    steps: Vec<Migration>,
}

impl MigrationChain {
    /// Validate and order a set of migrations.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidChain` if the set is empty, has duplicate
    /// revisions, has zero or several roots, references a missing
    /// predecessor, branches, or contains steps unreachable from the root.
    pub fn new(migrations: &[Migration]) -> Result<Self, Error> {
        if migrations.is_empty() {
            return Err(Error::InvalidChain("no migrations defined".into()));
        }

        let mut seen = HashSet::new();
        for m in migrations {
            if !seen.insert(m.revision) {
                return Err(Error::InvalidChain(format!("duplicate revision {}", m.revision)));
            }
        }

        let roots: Vec<&Migration> = migrations.iter().filter(|m| m.down_revision.is_none()).collect();
        if roots.len() != 1 {
            return Err(Error::InvalidChain(format!("expected exactly one root, found {}", roots.len())));
        }

        let mut by_parent: HashMap<&str, &Migration> = HashMap::new();
        for m in migrations {
            let Some(parent) = m.down_revision else { continue };
            if !seen.contains(parent) {
                return Err(Error::InvalidChain(format!("{} points at missing revision {parent}", m.revision)));
            }
            if let Some(other) = by_parent.insert(parent, m) {
                return Err(Error::InvalidChain(format!(
                    "branch at {parent}: both {} and {} follow it",
                    other.revision, m.revision
                )));
            }
        }

        let mut steps = Vec::with_capacity(migrations.len());
        let mut cursor = Some(roots[0]);
        while let Some(step) = cursor {
            steps.push(*step);
            cursor = by_parent.get(step.revision).copied();
        }

        if steps.len() != migrations.len() {
            let reachable: HashSet<&str> = steps.iter().map(|m| m.revision).collect();
            let stranded: Vec<&str> =
                migrations.iter().map(|m| m.revision).filter(|r| !reachable.contains(r)).collect();
            return Err(Error::InvalidChain(format!("unreachable from root (cycle?): {}", stranded.join(", "))));
        }

        Ok(Self { steps })
    }

    /// The built-in SkillMeat cache chain.
    pub fn builtin() -> Result<Self, Error> {
        Self::new(steps::MIGRATIONS)
    }

    /// Steps from root to head.
    pub fn steps(&self) -> &[Migration] {
        &self.steps
    }

    /// Latest revision.
    pub fn head(&self) -> &'static str {
        self.steps[self.steps.len() - 1].revision
    }

    /// Index of `revision` in root-to-head order.
    pub fn position(&self, revision: &str) -> Option<usize> {
        self.steps.iter().position(|m| m.revision == revision)
    }

    /// Resolve a target to a chain index; `None` means base.
    fn resolve(&self, target: &Target) -> Result<Option<usize>, Error> {
        match target {
            Target::Head => Ok(Some(self.steps.len() - 1)),
            Target::Base => Ok(None),
            Target::Revision(rev) => {
                self.position(rev).map(Some).ok_or_else(|| Error::UnknownRevision(rev.clone()))
            }
        }
    }
}

fn ensure_bookkeeping(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            revision TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Chain index of the current revision, `None` for an empty database.
///
/// # Errors
///
/// Returns `Error::UnknownRevision` if the database records a revision this
/// build does not know, and `Error::MigrationFailed` if the applied set has a
/// gap.
pub fn current_position(conn: &Connection, chain: &MigrationChain) -> Result<Option<usize>, Error> {
    ensure_bookkeeping(conn)?;

    let mut stmt = conn.prepare("SELECT revision FROM _migrations")?;
    let applied: HashSet<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, rusqlite::Error>>()?;

    if let Some(unknown) = applied.iter().find(|rev| chain.position(rev).is_none()) {
        return Err(Error::UnknownRevision(unknown.clone()));
    }

    if let Some(gap) = chain.steps()[..applied.len()].iter().find(|m| !applied.contains(m.revision)) {
        return Err(Error::MigrationFailed(format!(
            "applied revisions are not a prefix of the chain; {} is missing",
            gap.revision
        )));
    }

    Ok(applied.len().checked_sub(1))
}

/// Apply every step after the current revision up to `target`.
///
/// Returns the revisions applied, oldest first.
pub fn upgrade_sync(conn: &mut Connection, chain: &MigrationChain, target: &Target) -> Result<Vec<String>, Error> {
    let current = current_position(conn, chain)?;
    let Some(goal) = chain.resolve(target)? else {
        return match current {
            None => Ok(Vec::new()),
            Some(_) => Err(Error::InvalidInput("cannot upgrade to base; use downgrade".into())),
        };
    };

    if matches!(current, Some(c) if c > goal) {
        return Err(Error::InvalidInput(format!(
            "target {} is behind the current revision; use downgrade",
            chain.steps()[goal].revision
        )));
    }

    let start = current.map_or(0, |c| c + 1);
    if start > goal {
        tracing::debug!(revision = chain.steps()[goal].revision, "schema already at target");
        return Ok(Vec::new());
    }

    with_migration_pragmas(conn, |conn| {
        let mut applied = Vec::new();
        for step in &chain.steps()[start..=goal] {
            apply_step(conn, step, Direction::Up)?;
            applied.push(step.revision.to_string());
        }
        Ok(applied)
    })
}

/// Revert steps from the current revision down to, but not including, `target`.
///
/// Returns the revisions reverted, newest first.
pub fn downgrade_sync(conn: &mut Connection, chain: &MigrationChain, target: &Target) -> Result<Vec<String>, Error> {
    if *target == Target::Head {
        return Err(Error::InvalidInput("downgrade needs a revision or 'base'".into()));
    }

    let current = current_position(conn, chain)?;
    let goal = chain.resolve(target)?;

    let Some(current) = current else {
        return match goal {
            None => Ok(Vec::new()),
            Some(_) => Err(Error::InvalidInput("database is empty; nothing to downgrade".into())),
        };
    };

    if matches!(goal, Some(g) if g > current) {
        return Err(Error::InvalidInput("target is ahead of the current revision; use upgrade".into()));
    }

    let stop = goal.map_or(0, |g| g + 1);
    if stop > current {
        return Ok(Vec::new());
    }

    with_migration_pragmas(conn, |conn| {
        let mut reverted = Vec::new();
        for step in chain.steps()[stop..=current].iter().rev() {
            apply_step(conn, step, Direction::Down)?;
            reverted.push(step.revision.to_string());
        }
        Ok(reverted)
    })
}

/// Chain annotated with applied state.
pub fn history_sync(conn: &Connection, chain: &MigrationChain) -> Result<Vec<HistoryEntry>, Error> {
    let current = current_position(conn, chain)?;
    Ok(chain
        .steps()
        .iter()
        .enumerate()
        .map(|(idx, m)| HistoryEntry {
            revision: m.revision.to_string(),
            down_revision: m.down_revision.map(str::to_string),
            description: m.description.to_string(),
            applied: current.is_some_and(|c| idx <= c),
            current: current == Some(idx),
        })
        .collect())
}

/// Run `f` with foreign keys off and legacy rename semantics on.
///
/// Table rebuilds rename the live table to a staging name; with the legacy
/// flag SQLite leaves child `REFERENCES` clauses pointing at the original
/// name, and with foreign keys off dropping the staging table never
/// cascades. Both pragmas are no-ops inside a transaction, so they are set
/// here, around the per-step transactions. The caller's values are restored
/// afterwards.
fn with_migration_pragmas<T>(
    conn: &mut Connection, f: impl FnOnce(&mut Connection) -> Result<T, Error>,
) -> Result<T, Error> {
    let foreign_keys: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    let legacy_alter: bool = conn.query_row("PRAGMA legacy_alter_table", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA foreign_keys=OFF; PRAGMA legacy_alter_table=ON;")?;

    let result = f(conn);
    let restored = conn.execute_batch(&format!(
        "PRAGMA legacy_alter_table={}; PRAGMA foreign_keys={};",
        if legacy_alter { "ON" } else { "OFF" },
        if foreign_keys { "ON" } else { "OFF" },
    ));

    let value = result?;
    restored?;
    report_foreign_key_violations(conn)?;
    Ok(value)
}

fn report_foreign_key_violations(conn: &Connection) -> Result<usize, Error> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut count = 0;
    for row in rows {
        let (table, rowid, parent) = row?;
        tracing::warn!(table = %table, rowid = ?rowid, parent = %parent, "foreign key violation after migration");
        count += 1;
    }
    Ok(count)
}

fn apply_step(conn: &mut Connection, step: &Migration, direction: Direction) -> Result<(), Error> {
    let started = Instant::now();
    let tx = conn.transaction()?;

    let outcome = match direction {
        Direction::Up => (step.upgrade)(&tx),
        Direction::Down => (step.downgrade)(&tx),
    };
    outcome.map_err(|e| Error::MigrationFailed(format!("{} ({direction}): {e}", step.revision)))?;

    match direction {
        Direction::Up => tx.execute(
            "INSERT INTO _migrations (revision, applied_at) VALUES (?1, ?2)",
            params![step.revision, chrono::Utc::now().to_rfc3339()],
        )?,
        Direction::Down => tx.execute("DELETE FROM _migrations WHERE revision = ?1", params![step.revision])?,
    };

    tx.commit()?;

    tracing::info!(
        revision = step.revision,
        direction = %direction,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "{}",
        step.description
    );
    Ok(())
}

/// Upgrade the database to head.
///
/// This creates the _migrations table if it doesn't exist, reads the
/// current revision, and applies every step after it.
///
/// # Errors
///
/// Returns an error if the chain is malformed or a migration fails.
pub async fn run(conn: &tokio_rusqlite::Connection) -> Result<Vec<String>, Error> {
    conn.call(|conn| -> Result<Vec<String>, Error> {
        let chain = MigrationChain::builtin()?;
        upgrade_sync(conn, &chain, &Target::Head)
    })
    .await
    .map_err(Error::from)
}

impl CacheDb {
    /// Apply pending migrations up to `target`.
    pub async fn upgrade(&self, target: Target) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let chain = MigrationChain::builtin()?;
                upgrade_sync(conn, &chain, &target)
            })
            .await
            .map_err(Error::from)
    }

    /// Revert applied migrations down to `target`.
    pub async fn downgrade(&self, target: Target) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let chain = MigrationChain::builtin()?;
                downgrade_sync(conn, &chain, &target)
            })
            .await
            .map_err(Error::from)
    }

    /// Revision the database currently sits at.
    pub async fn current_revision(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let chain = MigrationChain::builtin()?;
                let position = current_position(conn, &chain)?;
                Ok(position.map(|idx| chain.steps()[idx].revision.to_string()))
            })
            .await
            .map_err(Error::from)
    }

    /// Every revision in the chain with its applied state.
    pub async fn migration_history(&self) -> Result<Vec<HistoryEntry>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<HistoryEntry>, Error> {
                let chain = MigrationChain::builtin()?;
                history_sync(conn, &chain)
            })
            .await
            .map_err(Error::from)
    }
}
