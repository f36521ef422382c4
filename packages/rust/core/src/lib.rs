//! Changelog publishing service.
//!
//! Accepted pull request changelogs are written as part records, and a
//! debounced publish cycle folds them into the consolidated documents and
//! pushes the result (`service::start`).

pub mod compact;
pub mod coordinator;
pub mod events;
pub mod process;
pub mod publish;
pub mod service;
pub mod vcs;
