//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SKILLMEAT_*)
//! 2. TOML config file (if SKILLMEAT_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded [`AppConfig`] is built once at process start and handed to
//! whatever needs it; nothing in the crate reads configuration globally.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SKILLMEAT_*)
/// 2. TOML config file (if SKILLMEAT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via SKILLMEAT_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// JSON file holding user settings such as the GitHub token.
    ///
    /// Set via SKILLMEAT_SETTINGS_PATH environment variable.
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Project root; `icon-packs.config.json` lives here.
    ///
    /// Set via SKILLMEAT_PROJECT_ROOT environment variable.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Base URL of the GitHub REST API.
    ///
    /// Set via SKILLMEAT_GITHUB_API_URL environment variable.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SKILLMEAT_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SKILLMEAT_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Address the settings API binds to.
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Port the settings API binds to (0 picks a free port).
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Symbol catalog settings.
    ///
    /// Nested keys use a double underscore, e.g. SKILLMEAT_SYMBOLS__DEFAULT_LIMIT.
    #[serde(default)]
    pub symbols: SymbolsConfig,
}

/// Settings for the symbol catalog tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolsConfig {
    /// Catalog file used when a command does not name one.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Result cap applied when a query does not set its own limit.
    #[serde(default = "default_symbol_limit")]
    pub default_limit: usize,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self { catalog_path: default_catalog_path(), default_limit: default_symbol_limit() }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./.skillmeat/cache.db")
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("./.skillmeat/settings.json")
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_user_agent() -> String {
    "skillmeat/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}

fn default_server_port() -> u16 {
    8080
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("ai/symbols.json")
}

fn default_symbol_limit() -> usize {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            settings_path: default_settings_path(),
            project_root: default_project_root(),
            github_api_url: default_github_api_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            symbols: SymbolsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Location of the icon pack configuration file.
    pub fn icon_packs_path(&self) -> PathBuf {
        self.project_root.join("icon-packs.config.json")
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SKILLMEAT_`
    /// 2. TOML file from `SKILLMEAT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SKILLMEAT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SKILLMEAT_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
