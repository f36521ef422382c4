//! Service wiring: configuration in, running coordinator and router out.

use std::sync::Arc;

use changelog_shared::{AppConfig, Result, validate_config};
use changelog_storage::PartsStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::compact::ScriptCompactor;
use crate::coordinator;
use crate::events::{EventRouter, parts_file_pattern};
use crate::publish::{PublishSequence, PublishSettings};
use crate::vcs::SystemGit;

/// A running changelog service.
pub struct ChangelogService {
    pub router: EventRouter,
    /// Completes once the coordinator has stopped.
    pub task: JoinHandle<()>,
}

/// The production publish cycle: system git plus the repository's script.
pub fn publisher_from_config(config: &AppConfig) -> PublishSequence<SystemGit, ScriptCompactor> {
    PublishSequence::new(
        SystemGit::new(config.repo.working_copy(), config.commit.ssh_key.clone()),
        ScriptCompactor::new(config.repo.script_path()),
        PublishSettings::from(config),
    )
}

/// Validate `config`, spawn the coordinator, and build a router feeding it.
///
/// Must be called from within a tokio runtime.
pub fn start(config: &AppConfig, shutdown: watch::Receiver<bool>) -> Result<ChangelogService> {
    validate_config(config)?;
    let parts_pattern = parts_file_pattern(&config.repo.parts_dir)?;

    let store = Arc::new(PartsStore::new(config.repo.parts_path()));
    let publisher = Arc::new(publisher_from_config(config));
    let (handle, task) = coordinator::spawn(store, publisher, config.publish.delay(), shutdown);

    let categories = config.categories();
    info!(
        repo = %config.repo.working_copy().display(),
        branch = %config.repo.branch,
        categories = ?categories.iter().collect::<Vec<_>>(),
        "changelog service started"
    );

    let router = EventRouter::new(handle, categories, config.repo.branch.clone(), parts_pattern);
    Ok(ChangelogService { router, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use changelog_shared::ChangelogError;

    use crate::events::RouteOutcome;

    #[tokio::test]
    async fn rejects_invalid_config() {
        let (_tx, rx) = watch::channel(false);
        let err = start(&AppConfig::default(), rx).err().unwrap();
        assert!(matches!(err, ChangelogError::Config { .. }));
    }

    #[tokio::test]
    async fn routes_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.repo.path = dir.path().display().to_string();

        let (tx, rx) = watch::channel(false);
        let service = start(&config, rx).unwrap();

        let outcome = service
            .router
            .dispatch("push", br#"{"ref": "refs/heads/master", "commits": []}"#)
            .unwrap();
        assert!(matches!(outcome, RouteOutcome::Ignored(_)));

        tx.send(true).unwrap();
        service.task.await.unwrap();
    }
}
