//! Shared types, error model, and configuration for the changelog service.
//!
//! This crate is the foundation depended on by all other changelog crates.
//! It provides:
//! - [`ChangelogError`]: the unified error type
//! - Domain types ([`ChangelogResult`], [`CategoryBlock`], [`ChangeEntry`], [`CategorySet`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CommitConfig, PublishConfig, RepoConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{ChangelogError, Result};
pub use types::{
    CategoryBlock, CategorySet, ChangeEntry, ChangeType, ChangelogResult, MAIN_CATEGORY,
    Submission,
};
