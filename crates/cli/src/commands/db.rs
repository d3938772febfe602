//! The `db` subcommand: drive the cache migration chain.

use std::io::Write;

use anyhow::Context as _;
use skillmeat_core::CacheDb;
use skillmeat_core::cache::Target;

use crate::{Context, ExitCode};

#[derive(Debug, clap::Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub action: DbAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum DbAction {
    /// Apply migrations up to a revision (default: head).
    Upgrade {
        #[arg(long, default_value = "head")]
        to: String,
    },
    /// Revert migrations down to a revision or `base`.
    Downgrade {
        #[arg(long)]
        to: String,
    },
    /// Print the current revision.
    Current,
    /// List the migration chain with applied markers.
    History,
    /// Verify primary keys and schema version; exits 1 on findings.
    Check,
}

pub async fn execute(args: DbArgs, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    let path = &ctx.config.db_path;
    // only upgrade may create the file
    let db = match args.action {
        DbAction::Upgrade { .. } => CacheDb::connect(path).await,
        _ => CacheDb::connect_existing(path).await,
    }
    .with_context(|| format!("opening {}", path.display()))?;
    tracing::debug!(db = %path.display(), action = ?args.action, "db command");

    match args.action {
        DbAction::Upgrade { to } => {
            let applied = db.upgrade(to.parse::<Target>()?).await?;
            if applied.is_empty() {
                writeln!(out, "already at target")?;
            }
            for revision in applied {
                writeln!(out, "applied {revision}")?;
            }
        }
        DbAction::Downgrade { to } => {
            let reverted = db.downgrade(to.parse::<Target>()?).await?;
            if reverted.is_empty() {
                writeln!(out, "already at target")?;
            }
            for revision in reverted {
                writeln!(out, "reverted {revision}")?;
            }
        }
        DbAction::Current => {
            let current = db.current_revision().await?;
            writeln!(out, "{}", current.as_deref().unwrap_or("base"))?;
        }
        DbAction::History => {
            for entry in db.migration_history().await? {
                let marker = if entry.current {
                    " (current)"
                } else if entry.applied {
                    " (applied)"
                } else {
                    ""
                };
                writeln!(
                    out,
                    "{} -> {}{marker}  {}",
                    entry.down_revision.as_deref().unwrap_or("<base>"),
                    entry.revision,
                    entry.description
                )?;
            }
        }
        DbAction::Check => {
            let report = db.verify().await?;
            for warning in &report.warnings {
                writeln!(out, "warning: {warning}")?;
            }
            for finding in &report.findings {
                writeln!(out, "error: {finding}")?;
            }
            if !report.is_clean() {
                return Ok(ExitCode::Failure);
            }
            writeln!(out, "ok: {} (schema {})", report.head, report.expected_schema_version)?;
        }
    }
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_code_for;
    use skillmeat_core::AppConfig;

    fn ctx(dir: &tempfile::TempDir) -> Context {
        Context::new(AppConfig::default(), Some(dir.path().join("cache.db")))
    }

    async fn run(ctx: &Context, action: DbAction) -> (anyhow::Result<ExitCode>, String) {
        let mut out = Vec::new();
        let result = execute(DbArgs { action }, ctx, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_upgrade_current_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);

        let (code, text) = run(&ctx, DbAction::Upgrade { to: "head".into() }).await;
        assert_eq!(code.unwrap(), ExitCode::Success);
        assert!(text.starts_with("applied 0001_initial_schema"));
        assert!(text.trim_end().ends_with("applied 0013_normalize_tags"));

        let (_, text) = run(&ctx, DbAction::Current).await;
        assert_eq!(text.trim(), "0013_normalize_tags");

        let (code, text) = run(&ctx, DbAction::Check).await;
        assert_eq!(code.unwrap(), ExitCode::Success);
        assert!(text.starts_with("ok:"));
    }

    #[tokio::test]
    async fn test_downgrade_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        run(&ctx, DbAction::Upgrade { to: "head".into() }).await.0.unwrap();

        let (code, text) = run(&ctx, DbAction::Downgrade { to: "0010_catalog_deep_search".into() }).await;
        assert_eq!(code.unwrap(), ExitCode::Success);
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("reverted 0013_normalize_tags"));

        let (_, text) = run(&ctx, DbAction::History).await;
        assert!(text.contains("0010_catalog_deep_search (current)"));
        assert!(text.contains("0001_initial_schema (applied)"));
        assert!(text.contains("<base> -> 0001_initial_schema"));

        let (code, text) = run(&ctx, DbAction::Check).await;
        assert_eq!(code.unwrap(), ExitCode::Failure);
        assert!(text.contains("head is 0013_normalize_tags"));
    }

    #[tokio::test]
    async fn test_read_only_actions_need_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        for action in [DbAction::Current, DbAction::History, DbAction::Check] {
            let (result, _) = run(&ctx, action).await;
            assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::NotFound);
        }
        assert!(!ctx.config.db_path.exists());

        run(&ctx, DbAction::Downgrade { to: "base".into() }).await.0.unwrap_err();
        assert!(!ctx.config.db_path.exists());
    }

    #[tokio::test]
    async fn test_unknown_revision_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (result, _) = run(&ctx(&dir), DbAction::Upgrade { to: "9999_nope".into() }).await;
        assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::NotFound);

        let ctx = ctx(&dir);
        run(&ctx, DbAction::Upgrade { to: "head".into() }).await.0.unwrap();
        let (result, _) = run(&ctx, DbAction::Downgrade { to: "head".into() }).await;
        assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::Usage);
    }
}
