//! The `symbols` subcommand: look up entries in a symbol catalog.

use std::io::Write;
use std::path::PathBuf;

use skillmeat_core::symbols::{SymbolCatalog, SymbolQuery};

use crate::{Context, ExitCode};

#[derive(Debug, clap::Args)]
pub struct SymbolsArgs {
    #[command(subcommand)]
    pub action: SymbolsAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum SymbolsAction {
    /// Search a catalog by name, kind, path prefix or layer.
    Query {
        /// Catalog file (default: `symbols.catalog_path` from config).
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Case-insensitive substring of the symbol name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        /// Path prefix.
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        layer: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(args: SymbolsArgs, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
    let SymbolsAction::Query { catalog, name, kind, path, layer, limit, json } = args.action;
    let catalog_path = catalog.unwrap_or_else(|| ctx.config.symbols.catalog_path.clone());
    let catalog = SymbolCatalog::load(&catalog_path)?;

    let query = SymbolQuery { name, kind, path_prefix: path, layer, limit };
    let hits = catalog.query(&query, &ctx.config.symbols);
    tracing::debug!(catalog = %catalog_path.display(), hits = hits.len(), "symbol query");

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&hits)?)?;
        return Ok(ExitCode::Success);
    }

    for symbol in hits {
        let location = match (&symbol.path, symbol.line) {
            (Some(path), Some(line)) => format!("{path}:{line}"),
            (Some(path), None) => path.clone(),
            _ => "-".to_string(),
        };
        write!(out, "{:<10} {:<32} {location}", symbol.kind, symbol.name)?;
        if let Some(summary) = &symbol.summary {
            write!(out, "  {summary}")?;
        }
        writeln!(out)?;
    }
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillmeat_core::{AppConfig, SymbolsConfig};

    const CATALOG: &str = r#"{"modules": [
        {"path": "src/cache.rs", "symbols": [
            {"name": "CacheDb", "kind": "struct", "line": 12, "summary": "SQLite cache handle"},
            {"name": "cache_key", "kind": "function", "line": 80}
        ]},
        {"path": "src/routes.rs", "symbols": [{"name": "router", "kind": "function"}]}
    ]}"#;

    fn ctx(dir: &tempfile::TempDir) -> Context {
        let catalog_path = dir.path().join("symbols.json");
        std::fs::write(&catalog_path, CATALOG).unwrap();
        let config = AppConfig { symbols: SymbolsConfig { catalog_path, default_limit: 20 }, ..AppConfig::default() };
        Context::new(config, None)
    }

    fn query(name: Option<&str>, limit: Option<usize>, json: bool) -> SymbolsArgs {
        SymbolsArgs {
            action: SymbolsAction::Query {
                catalog: None,
                name: name.map(str::to_string),
                kind: None,
                path: None,
                layer: None,
                limit,
                json,
            },
        }
    }

    #[test]
    fn test_query_uses_configured_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let code = execute(query(Some("cache"), None, false), &ctx(&dir), &mut out).unwrap();
        assert_eq!(code, ExitCode::Success);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("cache_key"));
        assert!(lines[1].contains("CacheDb") && lines[1].contains("src/cache.rs:12"));
        assert!(lines[1].ends_with("SQLite cache handle"));
    }

    #[test]
    fn test_json_output_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        execute(query(None, Some(1), true), &ctx(&dir), &mut out).unwrap();
        let hits: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_missing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = query(None, None, false);
        let SymbolsAction::Query { catalog, .. } = &mut args.action;
        *catalog = Some(dir.path().join("nope.json"));
        let err = execute(args, &ctx(&dir), &mut Vec::new()).unwrap_err();
        assert_eq!(crate::exit_code_for(&err), ExitCode::NotFound);
    }
}
