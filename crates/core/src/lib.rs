//! Core types and shared functionality for SkillMeat.
//!
//! This crate provides:
//! - The SQLite cache with its migration chain and entity repositories
//! - Frontmatter editing, schema validation and progress tracking
//! - Symbol catalog queries
//! - JSON-backed user settings
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod progress;
pub mod settings;
pub mod symbols;
pub mod types;

pub use cache::CacheDb;
pub use config::{AppConfig, ConfigError, SymbolsConfig};
pub use error::Error;
