//! SQLite-backed SkillMeat cache.
//!
//! This module provides the persistent project and artifact cache using
//! SQLite with async access via tokio-rusqlite. It covers:
//!
//! - The ordered migration chain and its table-rebuild and FTS5 helpers
//! - Schema metadata and verification
//! - Typed repositories for every table at head
//! - WAL mode for concurrent access

pub mod artifacts;
pub mod catalog;
pub mod collections;
pub mod composites;
pub mod connection;
pub mod hash;
pub mod memory;
pub mod metadata;
pub mod migrations;
pub mod profiles;
pub mod projects;
pub mod verify;

pub use crate::Error;

pub use artifacts::{Artifact, ArtifactInput, Tag};
pub use catalog::{CatalogEntry, CatalogEntryInput, MarketplaceSource};
pub use collections::{Collection, Group};
pub use composites::{Composite, CompositeMember};
pub use connection::CacheDb;
pub use memory::{ContextModule, MemoryItem};
pub use metadata::SCHEMA_VERSION;
pub use migrations::{HistoryEntry, Migration, MigrationChain, Target};
pub use profiles::DeploymentProfile;
pub use projects::Project;
pub use verify::{EXPECTED_PRIMARY_KEYS, VerifyReport};
