//! The `progress` subcommand: update task statuses in a progress file.

use std::io::Write;
use std::path::PathBuf;

use skillmeat_core::frontmatter::Document;
use skillmeat_core::progress::{self, ProgressSummary, TaskStatus, TaskUpdate};

use crate::ExitCode;

#[derive(Debug, clap::Args)]
pub struct ProgressArgs {
    #[command(subcommand)]
    pub action: ProgressAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum ProgressAction {
    /// Set the status of one task.
    UpdateStatus {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        task: String,
        #[arg(long)]
        status: String,
        /// Print the updated file instead of writing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Set several statuses at once: `--updates "T1:completed,T2:in_progress"`.
    UpdateBatch {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        updates: String,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn execute(args: ProgressArgs, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    let (file, updates, dry_run) = match args.action {
        ProgressAction::UpdateStatus { file, task, status, dry_run } => {
            let status: TaskStatus = status.parse()?;
            (file, vec![TaskUpdate { id: task, status }], dry_run)
        }
        ProgressAction::UpdateBatch { file, updates, dry_run } => (file, progress::parse_batch(&updates)?, dry_run),
    };

    let mut doc = Document::read(&file)?;
    let summary = progress::apply_batch(&mut doc, &updates)?;

    if dry_run {
        write!(out, "{}", doc.render()?)?;
        return Ok(ExitCode::Success);
    }

    doc.write(&file)?;
    tracing::info!(file = %file.display(), updates = updates.len(), progress = summary.progress, "updated progress file");
    for update in &updates {
        writeln!(out, "{} -> {}", update.id, update.status)?;
    }
    writeln!(out, "{}", describe(&summary))?;
    Ok(ExitCode::Success)
}

fn describe(summary: &ProgressSummary) -> String {
    format!(
        "progress {}% ({}), {}/{} completed, {} in progress, {} blocked, {} at risk",
        summary.progress,
        summary.status,
        summary.completed_tasks,
        summary.total_tasks,
        summary.in_progress_tasks,
        summary.blocked_tasks,
        summary.at_risk_tasks
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_code_for;

    const FILE: &str = "---\ntitle: Phase 3\nstatus: pending\ntasks:\n  - id: TASK-3.1\n    status: pending\n  - id: TASK-3.2\n    status: pending\n---\n\n# Phase 3\n";

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-3-progress.md");
        std::fs::write(&path, FILE).unwrap();
        (dir, path)
    }

    fn run(action: ProgressAction) -> (anyhow::Result<ExitCode>, String) {
        let mut out = Vec::new();
        let result = execute(ProgressArgs { action }, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_update_status_writes_file() {
        let (_dir, path) = fixture();
        let (code, text) = run(ProgressAction::UpdateStatus {
            file: path.clone(),
            task: "TASK-3.1".into(),
            status: "in_progress".into(),
            dry_run: false,
        });
        assert_eq!(code.unwrap(), ExitCode::Success);
        assert!(text.contains("TASK-3.1 -> in_progress"));
        assert!(text.contains("progress 0% (in_progress)"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("in_progress_tasks: 1"));
        assert!(written.ends_with("\n# Phase 3\n"));
    }

    #[test]
    fn test_batch_dry_run_leaves_file() {
        let (_dir, path) = fixture();
        let (code, text) = run(ProgressAction::UpdateBatch {
            file: path.clone(),
            updates: "TASK-3.1:completed,TASK-3.2:completed".into(),
            dry_run: true,
        });
        assert_eq!(code.unwrap(), ExitCode::Success);
        assert!(text.contains("progress: 100"));
        assert!(text.contains("status: completed"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), FILE);
    }

    #[test]
    fn test_error_exit_codes() {
        let (_dir, path) = fixture();
        let (result, _) = run(ProgressAction::UpdateStatus {
            file: path.clone(),
            task: "TASK-9.9".into(),
            status: "completed".into(),
            dry_run: false,
        });
        assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::NotFound);

        let (result, _) = run(ProgressAction::UpdateStatus {
            file: path.clone(),
            task: "TASK-3.1".into(),
            status: "finished".into(),
            dry_run: false,
        });
        assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::Usage);

        let (result, _) = run(ProgressAction::UpdateBatch {
            file: path.with_file_name("missing.md"),
            updates: "TASK-3.1:completed".into(),
            dry_run: false,
        });
        assert_eq!(exit_code_for(&result.unwrap_err()), ExitCode::NotFound);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), FILE);
    }
}
