use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skillmeat_cli::{Context, ExitCode, commands, exit_code_for};
use skillmeat_core::AppConfig;
use tracing_subscriber::EnvFilter;

/// SkillMeat -- cache migrations and authoring tools.
#[derive(Parser)]
#[command(name = "skillmeat", version)]
struct Cli {
    /// Cache database (overrides SKILLMEAT_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade, downgrade and inspect the cache schema.
    Db(commands::db::DbArgs),
    /// Update task statuses in progress files.
    Progress(commands::progress::ProgressArgs),
    /// Validate and edit markdown frontmatter.
    Frontmatter(commands::frontmatter::FrontmatterArgs),
    /// Query symbol catalogs.
    Symbols(commands::symbols::SymbolsArgs),
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("skillmeat: error: {err}");
            return ExitCode::Usage.into();
        }
    };
    let ctx = Context::new(config, cli.db);
    let mut stdout = std::io::stdout().lock();

    let result = match cli.command {
        Commands::Db(args) => commands::db::execute(args, &ctx, &mut stdout).await,
        Commands::Progress(args) => commands::progress::execute(args, &mut stdout),
        Commands::Frontmatter(args) => commands::frontmatter::execute(args, &mut stdout),
        Commands::Symbols(args) => commands::symbols::execute(args, &ctx, &mut stdout),
    };

    match result {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("skillmeat: error: {err:#}");
            exit_code_for(&err).into()
        }
    }
}
