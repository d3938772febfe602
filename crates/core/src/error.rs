//! Unified error types for SkillMeat.
//!
//! Every variant carries a stable code prefix in its display form and maps to
//! one of the CLI exit codes (see [`Error::exit_code`]).

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the cache, the frontmatter tooling and the settings stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input or argument combination.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Requested file, row, task or revision does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Write would violate a uniqueness rule.
    #[error("CONFLICT: {0}")]
    Conflict(String),

    /// Filesystem refused the operation.
    #[error("PERMISSION_DENIED: {0}")]
    PermissionDenied(String),

    /// Markdown frontmatter could not be split or parsed.
    #[error("INVALID_FRONTMATTER: {0}")]
    InvalidFrontmatter(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply or revert.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The migration list does not form a single linear chain.
    #[error("CACHE_ERROR: invalid migration chain: {0}")]
    InvalidChain(String),

    /// A revision recorded or requested is not part of the chain.
    #[error("CACHE_ERROR: unknown revision: {0}")]
    UnknownRevision(String),

    /// Serialization or deserialization failed.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Other I/O failure.
    #[error("IO_ERROR: {0}")]
    Io(String),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// | Code | Meaning           |
    /// |------|-------------------|
    /// | 1    | general error     |
    /// | 2    | invalid usage     |
    /// | 3    | not found         |
    /// | 4    | conflict          |
    /// | 5    | permission denied |
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidInput(_) => 2,
            Error::NotFound(_) | Error::UnknownRevision(_) => 3,
            Error::Conflict(_) => 4,
            Error::PermissionDenied(_) => 5,
            _ => 1,
        }
    }

    /// True if the underlying SQLite error is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Database(tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(e, _))) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }

    /// Turn a constraint violation into `Error::Conflict(message)`; any other
    /// error passes through.
    pub fn or_conflict(self, message: impl Into<String>) -> Self {
        if self.is_constraint_violation() { Error::Conflict(message.into()) } else { self }
    }

    /// Classify an I/O error against the path it touched.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.display().to_string()),
            _ => Error::Io(format!("{}: {err}", path.display())),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yml::Error> for Error {
    fn from(err: serde_yml::Error) -> Self {
        Error::InvalidFrontmatter(err.to_string())
    }
}
