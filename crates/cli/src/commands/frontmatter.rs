//! The `frontmatter` subcommand: validate and edit markdown headers.

use std::io::Write;
use std::path::{Path, PathBuf};

use skillmeat_core::frontmatter::schema::{self, Schema};
use skillmeat_core::frontmatter::{Document, parse_value};

use crate::ExitCode;

#[derive(Debug, clap::Args)]
pub struct FrontmatterArgs {
    #[command(subcommand)]
    pub action: FrontmatterAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum FrontmatterAction {
    /// Check a file against a schema; exits 1 when errors are found.
    Validate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        schema: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Set (or append to) a key, addressed by a dotted path.
    Set {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        key: String,
        /// Parsed as YAML: `42`, `true` and `[a, b]` keep their types.
        #[arg(long)]
        value: String,
        #[arg(long)]
        append: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn execute(args: FrontmatterArgs, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    match args.action {
        FrontmatterAction::Validate { file, schema, json } => validate(&file, &schema, json, out),
        FrontmatterAction::Set { file, key, value, append, dry_run } => {
            let mut doc = Document::read(&file)?;
            let value = parse_value(&value);
            if append {
                doc.append(&key, value)?;
            } else {
                doc.set(&key, value)?;
            }

            if dry_run {
                write!(out, "{}", doc.render()?)?;
            } else {
                doc.write(&file)?;
                tracing::info!(file = %file.display(), key = %key, append, "updated frontmatter");
                writeln!(out, "{}: {key} {}", file.display(), if append { "appended" } else { "set" })?;
            }
            Ok(ExitCode::Success)
        }
    }
}

fn validate(file: &Path, schema_path: &Path, json: bool, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    let schema = Schema::load(schema_path)?;
    let report = schema::validate_file(file, &schema)?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        for issue in &report.errors {
            writeln!(out, "error: {issue}")?;
        }
        for issue in &report.warnings {
            writeln!(out, "warning: {issue}")?;
        }
        if report.is_valid() {
            writeln!(out, "{}: valid", file.display())?;
        }
    }

    Ok(if report.is_valid() { ExitCode::Success } else { ExitCode::Failure })
}
