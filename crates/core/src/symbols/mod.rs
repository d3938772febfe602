//! Symbol catalogs: JSON indexes of code symbols used for targeted lookups.
//!
//! Two file shapes are accepted:
//!
//! ```json
//! {"version": "1", "modules": [{"path": "src/api.rs", "symbols": [{"name": "serve", "kind": "function"}]}]}
//! {"version": "1", "symbols": [{"name": "serve", "kind": "function", "file": "src/api.rs"}]}
//! ```
//!
//! Both load into a flat list. Saving always writes the module shape.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::config::SymbolsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: String,
    #[serde(default, alias = "file", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolCatalog {
    pub version: Option<String>,
    pub symbols: Vec<Symbol>,
}

/// Filters for [`SymbolCatalog::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SymbolQuery {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub path_prefix: Option<String>,
    pub layer: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    modules: Option<Vec<RawModule>>,
    #[serde(default)]
    symbols: Option<Vec<Symbol>>,
}

#[derive(Deserialize, Serialize)]
struct RawModule {
    path: String,
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Serialize)]
struct ModuleCatalog<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    modules: Vec<RawModule>,
}

impl SymbolCatalog {
    /// Parse either catalog shape.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let raw: RawCatalog = serde_json::from_str(text)?;
        let mut symbols = raw.symbols.unwrap_or_default();
        for module in raw.modules.unwrap_or_default() {
            symbols.extend(module.symbols.into_iter().map(|mut symbol| {
                if symbol.path.is_none() {
                    symbol.path = Some(module.path.clone());
                }
                symbol
            }));
        }
        Ok(Self { version: raw.version, symbols })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::from_io(e, path))?;
        let catalog = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), symbols = catalog.symbols.len(), "loaded symbol catalog");
        Ok(catalog)
    }

    /// Write in the module shape; symbols without a path go under `""`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let mut modules: BTreeMap<String, Vec<Symbol>> = BTreeMap::new();
        for symbol in &self.symbols {
            let module = symbol.path.clone().unwrap_or_default();
            let mut symbol = symbol.clone();
            symbol.path = None;
            modules.entry(module).or_default().push(symbol);
        }

        let out = ModuleCatalog {
            version: self.version.as_deref(),
            modules: modules.into_iter().map(|(path, symbols)| RawModule { path, symbols }).collect(),
        };
        let json = serde_json::to_string_pretty(&out)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
        }
        fs::write(path, json + "\n").map_err(|e| Error::from_io(e, path))
    }

    /// Replace every symbol whose path appears in `other` with `other`'s.
    pub fn merge(&mut self, other: SymbolCatalog) {
        let replaced: BTreeSet<Option<String>> = other.symbols.iter().map(|s| s.path.clone()).collect();
        self.symbols.retain(|s| !replaced.contains(&s.path));
        self.symbols.extend(other.symbols);
        if other.version.is_some() {
            self.version = other.version;
        }
    }

    /// Matching symbols, exact name matches first, capped at the query limit
    /// or `config.default_limit`.
    pub fn query(&self, query: &SymbolQuery, config: &SymbolsConfig) -> Vec<&Symbol> {
        let name = query.name.as_deref().map(str::to_lowercase);
        let eq = |want: &Option<String>, have: &Option<String>| match want {
            Some(want) => have.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(want)),
            None => true,
        };

        let mut hits: Vec<&Symbol> = self
            .symbols
            .iter()
            .filter(|s| name.as_deref().is_none_or(|n| s.name.to_lowercase().contains(n)))
            .filter(|s| query.kind.as_deref().is_none_or(|k| s.kind.eq_ignore_ascii_case(k)))
            .filter(|s| {
                query.path_prefix.as_deref().is_none_or(|p| s.path.as_deref().is_some_and(|path| path.starts_with(p)))
            })
            .filter(|s| eq(&query.layer, &s.layer))
            .collect();

        hits.sort_by_key(|s| {
            let exact = name.as_deref().is_some_and(|n| s.name.to_lowercase() == n);
            (!exact, s.name.to_lowercase(), s.path.clone(), s.line)
        });
        hits.truncate(query.limit.unwrap_or(config.default_limit));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULES: &str = r#"{
        "version": "2",
        "modules": [
            {"path": "src/cache/connection.rs", "symbols": [
                {"name": "open", "kind": "function", "line": 40, "layer": "cache"},
                {"name": "open_in_memory", "kind": "function", "line": 60, "layer": "cache"}
            ]},
            {"path": "src/api/routes.rs", "symbols": [
                {"name": "OpenApi", "kind": "struct", "layer": "api"},
                {"name": "router", "kind": "function", "layer": "api"}
            ]}
        ]
    }"#;

    fn config(limit: usize) -> SymbolsConfig {
        SymbolsConfig { default_limit: limit, ..SymbolsConfig::default() }
    }

    #[test]
    fn test_module_shape_inherits_path() {
        let catalog = SymbolCatalog::from_json(MODULES).unwrap();
        assert_eq!(catalog.symbols.len(), 4);
        assert_eq!(catalog.symbols[0].path.as_deref(), Some("src/cache/connection.rs"));
        assert_eq!(catalog.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_flat_shape_with_file_alias() {
        let catalog = SymbolCatalog::from_json(
            r#"{"symbols": [{"name": "Button", "kind": "component", "file": "ui/button.tsx", "line": 3}]}"#,
        )
        .unwrap();
        assert_eq!(catalog.symbols[0].path.as_deref(), Some("ui/button.tsx"));
        assert_eq!(catalog.symbols[0].line, Some(3));
    }

    #[test]
    fn test_query_exact_first_and_limits() {
        let catalog = SymbolCatalog::from_json(MODULES).unwrap();
        let q = SymbolQuery { name: Some("OPEN".into()), ..Default::default() };
        let names: Vec<&str> = catalog.query(&q, &config(20)).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["open", "open_in_memory", "OpenApi"]);

        assert_eq!(catalog.query(&q, &config(1)).len(), 1);
        let q = SymbolQuery { limit: Some(2), ..q };
        assert_eq!(catalog.query(&q, &config(1)).len(), 2);
    }

    #[test]
    fn test_query_filters() {
        let catalog = SymbolCatalog::from_json(MODULES).unwrap();
        let q = SymbolQuery { kind: Some("Function".into()), layer: Some("api".into()), ..Default::default() };
        let hits = catalog.query(&q, &config(20));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "router");

        let q = SymbolQuery { path_prefix: Some("src/cache".into()), ..Default::default() };
        assert_eq!(catalog.query(&q, &config(20)).len(), 2);
    }

    #[test]
    fn test_merge_replaces_paths() {
        let mut catalog = SymbolCatalog::from_json(MODULES).unwrap();
        let update = SymbolCatalog::from_json(
            r#"{"modules": [{"path": "src/api/routes.rs", "symbols": [{"name": "routes", "kind": "function"}]}]}"#,
        )
        .unwrap();
        catalog.merge(update);

        let api: Vec<&str> = catalog
            .symbols
            .iter()
            .filter(|s| s.path.as_deref() == Some("src/api/routes.rs"))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(api, vec!["routes"]);
        assert_eq!(catalog.symbols.len(), 3);
        assert_eq!(catalog.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_save_writes_module_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai/symbols-api.json");
        let flat = SymbolCatalog::from_json(
            r#"{"symbols": [{"name": "b", "kind": "fn", "file": "x.rs"}, {"name": "a", "kind": "fn", "file": "x.rs"}]}"#,
        )
        .unwrap();
        flat.save(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["modules"][0]["path"], "x.rs");
        assert_eq!(raw["modules"][0]["symbols"].as_array().map(Vec::len), Some(2));
        assert!(raw["modules"][0]["symbols"][0].get("path").is_none());
        assert_eq!(SymbolCatalog::load(&path).unwrap().symbols, flat.symbols);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SymbolCatalog::load("/nonexistent/symbols.json").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
