//! Subcommand implementations.
//!
//! Each command writes its normal output to the writer it is handed so the
//! tests can capture it.

pub mod db;
pub mod frontmatter;
pub mod progress;
pub mod symbols;
