//! User settings persisted as JSON files.
//!
//! [`SettingsStore`] holds the GitHub token; [`IconPackStore`] tracks which
//! icon packs the web UI offers. Unknown keys in either file are kept on
//! rewrite.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

const TOKEN_PREFIXES: [&str; 2] = ["github_pat_", "ghp_"];
const MIN_TOKEN_LEN: usize = 20;

/// Check that `token` looks like a GitHub personal access token.
///
/// # Errors
///
/// `Error::InvalidInput` unless the token starts with `ghp_` or
/// `github_pat_`, holds only `[A-Za-z0-9_]` and is at least 20 characters.
pub fn validate_token_format(token: &str) -> Result<(), Error> {
    if !TOKEN_PREFIXES.iter().any(|p| token.starts_with(p)) {
        return Err(Error::InvalidInput("token must start with ghp_ or github_pat_".into()));
    }
    if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidInput("token contains invalid characters".into()));
    }
    if token.len() < MIN_TOKEN_LEN {
        return Err(Error::InvalidInput(format!("token must be at least {MIN_TOKEN_LEN} characters")));
    }
    Ok(())
}

/// `ghp_...wxyz`: the prefix and the last four characters.
pub fn mask_token(token: &str) -> String {
    let prefix = TOKEN_PREFIXES.iter().find(|p| token.starts_with(**p)).copied().unwrap_or("");
    let tail_start = token.len().saturating_sub(4).max(prefix.len());
    let tail = token.get(tail_start..).unwrap_or_default();
    format!("{prefix}...{tail}")
}

fn read_object(path: &Path) -> Result<Option<Map<String, Value>>, Error> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Some(Map::new())),
        Ok(text) => match serde_json::from_str(&text)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(Error::Serialization(format!("{} must hold a JSON object", path.display()))),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::from_io(e, path)),
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;

    let mut file = open_private(path).map_err(|e| Error::from_io(e, path))?;
    file.write_all((json + "\n").as_bytes()).map_err(|e| Error::from_io(e, path))
}

/// Truncate or create `path` readable by the owner only, before any bytes
/// land in it.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
    // mode only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

/// Settings file at `AppConfig::settings_path`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn github_token(&self) -> Result<Option<String>, Error> {
        let settings = read_object(&self.path)?.unwrap_or_default();
        Ok(settings.get("github_token").and_then(Value::as_str).filter(|t| !t.is_empty()).map(str::to_string))
    }

    /// Validate the format and store the token.
    pub fn set_github_token(&self, token: &str) -> Result<(), Error> {
        validate_token_format(token)?;
        let mut settings = read_object(&self.path)?.unwrap_or_default();
        settings.insert("github_token".into(), Value::String(token.to_string()));
        write_json(&self.path, &settings)?;
        tracing::info!(path = %self.path.display(), token = %mask_token(token), "stored github token");
        Ok(())
    }

    /// Remove the token; returns whether one was set.
    pub fn clear_github_token(&self) -> Result<bool, Error> {
        let Some(mut settings) = read_object(&self.path)? else {
            return Ok(false);
        };
        let removed = settings.remove("github_token").is_some();
        if removed {
            write_json(&self.path, &settings)?;
            tracing::info!(path = %self.path.display(), "cleared github token");
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconPack {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IconPackUpdate {
    pub id: String,
    pub enabled: bool,
}

/// Packs offered when no configuration file exists.
pub fn default_icon_packs() -> Vec<IconPack> {
    [("lucide", "Lucide", true), ("heroicons", "Heroicons", false), ("tabler", "Tabler Icons", false)]
        .into_iter()
        .map(|(id, name, enabled)| IconPack { id: id.into(), name: name.into(), enabled })
        .collect()
}

/// `icon-packs.config.json` under the project root.
#[derive(Debug, Clone)]
pub struct IconPackStore {
    path: PathBuf,
}

impl IconPackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<(Map<String, Value>, Vec<IconPack>), Error> {
        match read_object(&self.path)? {
            Some(mut doc) => {
                let packs = match doc.remove("packs") {
                    Some(packs) => serde_json::from_value(packs)?,
                    None => default_icon_packs(),
                };
                Ok((doc, packs))
            }
            None => Ok((Map::new(), default_icon_packs())),
        }
    }

    pub fn list(&self) -> Result<Vec<IconPack>, Error> {
        Ok(self.load()?.1)
    }

    /// Toggle packs and persist the result.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if any id is unknown; nothing is written then.
    pub fn set_enabled(&self, updates: &[IconPackUpdate]) -> Result<Vec<IconPack>, Error> {
        let (mut doc, mut packs) = self.load()?;
        if let Some(unknown) = updates.iter().find(|u| !packs.iter().any(|p| p.id == u.id)) {
            return Err(Error::NotFound(format!("icon pack {}", unknown.id)));
        }
        for update in updates {
            for pack in packs.iter_mut().filter(|p| p.id == update.id) {
                pack.enabled = update.enabled;
            }
        }

        doc.insert("packs".into(), serde_json::to_value(&packs)?);
        write_json(&self.path, &doc)?;
        tracing::info!(path = %self.path.display(), updated = updates.len(), "saved icon packs");
        Ok(packs)
    }
}
