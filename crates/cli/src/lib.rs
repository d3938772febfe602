//! SkillMeat CLI: cache migrations, progress tracking, frontmatter editing
//! and symbol lookups.
//!
//! Every subcommand returns an [`ExitCode`]. Errors raised by the core crate
//! keep their own code through [`exit_code_for`].

use std::fmt;
use std::path::PathBuf;

use skillmeat_core::{AppConfig, Error};

pub mod commands;

/// Process exit codes.
///
/// | Code | Meaning                                   |
/// |------|-------------------------------------------|
/// | 0    | Success                                   |
/// | 1    | General error, including failed checks    |
/// | 2    | Invalid usage or input                    |
/// | 3    | File, task or revision not found          |
/// | 4    | Conflict                                  |
/// | 5    | Permission denied                         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    Usage = 2,
    NotFound = 3,
    Conflict = 4,
    PermissionDenied = 5,
}

impl ExitCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "general error",
            Self::Usage => "invalid usage",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission denied",
        }
    }

    fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::Usage,
            3 => Self::NotFound,
            4 => Self::Conflict,
            5 => Self::PermissionDenied,
            _ => Self::Failure,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {} ({})", self.as_u8(), self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

/// Exit code for an error bubbling out of a command.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(ExitCode::Failure, |e| ExitCode::from_u8(e.exit_code()))
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: AppConfig,
}

impl Context {
    /// Apply the global `--db` override on top of the loaded config.
    pub fn new(mut config: AppConfig, db: Option<PathBuf>) -> Self {
        if let Some(db) = db {
            config.db_path = db;
        }
        Self { config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_u8(), 0);
        assert_eq!(ExitCode::PermissionDenied.as_u8(), 5);
        assert!(ExitCode::Usage.to_string().contains("invalid usage"));
    }

    #[test]
    fn test_exit_code_for_core_errors() {
        let err = anyhow::Error::new(Error::NotFound("T9".into()));
        assert_eq!(exit_code_for(&err), ExitCode::NotFound);

        let wrapped = Err::<(), _>(Error::Conflict("dup".into())).context("saving").unwrap_err();
        assert_eq!(exit_code_for(&wrapped), ExitCode::Conflict);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), ExitCode::Failure);
    }

    #[test]
    fn test_db_override() {
        let ctx = Context::new(AppConfig::default(), Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(ctx.config.db_path, PathBuf::from("/tmp/x.db"));
        let ctx = Context::new(AppConfig::default(), None);
        assert_eq!(ctx.config.db_path, AppConfig::default().db_path);
    }
}
