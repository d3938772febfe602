//! Closed enums for the string columns of the cache schema.
//!
//! The database stores these as plain `TEXT` guarded by `CHECK` constraints;
//! in code they are parsed once at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::Error;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The stored text form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "invalid {} '{}': expected one of {}",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> tokio_rusqlite::rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: Error| FromSqlError::Other(e.to_string().into()))
            }
        }
    };
}

text_enum! {
    /// Kind of deployable artifact.
    ArtifactType {
        Skill => "skill",
        Command => "command",
        Agent => "agent",
        Mcp => "mcp",
        Hook => "hook",
    }
}

text_enum! {
    /// Health of a tracked project.
    ProjectStatus {
        Active => "active",
        Stale => "stale",
        Error => "error",
    }
}

text_enum! {
    /// Lifecycle of a marketplace catalog entry.
    CatalogStatus {
        New => "new",
        Updated => "updated",
        Removed => "removed",
        Imported => "imported",
        Excluded => "excluded",
    }
}

text_enum! {
    /// Trust assigned to a marketplace source.
    TrustLevel {
        Untrusted => "untrusted",
        Basic => "basic",
        Verified => "verified",
        Official => "official",
    }
}

text_enum! {
    /// Flavor of composite artifact.
    CompositeType {
        Plugin => "plugin",
        Stack => "stack",
        Suite => "suite",
    }
}

text_enum! {
    /// Category of a memory item.
    MemoryType {
        Decision => "decision",
        Constraint => "constraint",
        Gotcha => "gotcha",
        StyleRule => "style_rule",
        Learning => "learning",
    }
}

text_enum! {
    /// Promotion state of a memory item.
    MemoryStatus {
        Candidate => "candidate",
        Active => "active",
        Stable => "stable",
        Deprecated => "deprecated",
    }
}

text_enum! {
    /// Target platform of a deployment profile.
    Platform {
        ClaudeCode => "claude_code",
        Codex => "codex",
        Gemini => "gemini",
        Cursor => "cursor",
        Other => "other",
    }
}

impl ArtifactType {
    /// Build the legacy `type:name` key.
    pub fn key(self, name: &str) -> String {
        format!("{}:{}", self.as_str(), name)
    }
}

/// Lowercase `name`, collapse every run of non-alphanumerics to `-`, and trim
/// dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
