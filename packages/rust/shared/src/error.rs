//! Error types for the changelog service.
//!
//! Library crates use [`ChangelogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! A parse that finds no marker is not an error: the grammar returns `None`.

use std::path::PathBuf;

/// Top-level error type for all changelog operations.
#[derive(Debug, thiserror::Error)]
pub enum ChangelogError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external command could not be started or exited non-zero.
    #[error("`{command}` failed: {detail}")]
    Process { command: String, detail: String },

    /// An external command exceeded its time budget and was killed.
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// Record encoding or event payload decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Work was abandoned because shutdown was requested.
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ChangelogError>;

impl ChangelogError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a process failure for `command`.
    pub fn process(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures reported by an external collaborator
    /// (non-zero exit, spawn failure, or timeout).
    pub fn is_process_failure(&self) -> bool {
        matches!(self, Self::Process { .. } | Self::Timeout { .. })
    }
}
