//! Client code for SkillMeat.
//!
//! This crate provides the outbound HTTP clients shared by the server and
//! CLI. Today that is the GitHub REST client used to verify tokens.

pub mod github;

pub use github::{GitHubClient, GitHubConfig, GitHubError, GitHubUser, TokenVerifier};
