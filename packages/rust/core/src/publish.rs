//! The publish cycle: sync, compact, commit, push with retry.
//!
//! 1. Ensure the working copy exists (clone on first use)
//! 2. Checkout the target branch
//! 3. Pull with rebase
//! 4. Run compaction once per recognised category
//! 5. Stop if the working copy is clean
//! 6. Stage and commit
//! 7. Push, pulling again before each retry, at most [`MAX_PUSH_ATTEMPTS`] times
//!
//! Pushes race with other writers on the same branch. A failed push is retried
//! after re-syncing; anything left over is picked up by the next trigger.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use changelog_shared::{AppConfig, ChangelogError, Result};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::compact::Compactor;
use crate::vcs::{CommitIdentity, Vcs};

/// Total push attempts per cycle, including the first.
pub const MAX_PUSH_ATTEMPTS: u32 = 3;

/// Remote that publishes are pushed to.
const PUSH_REMOTE: &str = "origin";

// ---------------------------------------------------------------------------
// Settings & outcome
// ---------------------------------------------------------------------------

/// One compaction run: a target document and its category flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionTarget {
    pub document: PathBuf,
    /// `None` for the default category.
    pub category: Option<String>,
}

/// Everything the publish cycle needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Working copy root.
    pub repo: PathBuf,
    /// Remote to clone from on first use.
    pub remote: Option<String>,
    pub branch: String,
    pub parts_dir: PathBuf,
    /// One entry per recognised category, default first.
    pub targets: Vec<CompactionTarget>,
    /// Paths staged for the publish commit, relative to `repo`.
    pub stage: Vec<PathBuf>,
    pub identity: CommitIdentity,
    pub message: String,
    pub network_timeout: Duration,
}

impl From<&AppConfig> for PublishSettings {
    fn from(config: &AppConfig) -> Self {
        let categories = config.categories();
        let default = CompactionTarget {
            document: config
                .repo
                .document_path(&categories, categories.default_category()),
            category: None,
        };
        let targets = std::iter::once(default)
            .chain(categories.extras().map(|extra| CompactionTarget {
                document: config.repo.document_path(&categories, extra),
                category: Some(extra.to_string()),
            }))
            .collect();

        Self {
            repo: config.repo.working_copy(),
            remote: config.repo.remote.clone().filter(|r| !r.is_empty()),
            branch: config.repo.branch.clone(),
            parts_dir: config.repo.parts_path(),
            targets,
            stage: vec![PathBuf::from(&config.repo.changelog_dir)],
            identity: CommitIdentity::from(&config.commit),
            message: config.commit.message.clone(),
            network_timeout: Duration::from_secs(config.publish.network_timeout_secs),
        }
    }
}

/// How a completed cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Compaction changed nothing; no commit was made.
    NoChanges,
    /// Committed and pushed.
    Pushed { attempts: u32 },
    /// Committed, but every push attempt failed.
    PushAbandoned { attempts: u32 },
}

/// Anything the coordinator can run as a publish cycle.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self) -> Result<PublishOutcome>;
}

// ---------------------------------------------------------------------------
// PublishSequence
// ---------------------------------------------------------------------------

/// The ordered publish policy over a VCS and a compactor.
pub struct PublishSequence<V, C> {
    vcs: V,
    compactor: C,
    settings: PublishSettings,
}

impl<V: Vcs, C: Compactor> PublishSequence<V, C> {
    pub fn new(vcs: V, compactor: C, settings: PublishSettings) -> Self {
        Self {
            vcs,
            compactor,
            settings,
        }
    }

    /// Run one full cycle.
    ///
    /// Failures before the push abort the cycle with an error. Push failures
    /// are retried and, once exhausted, reported as
    /// [`PublishOutcome::PushAbandoned`] rather than an error.
    #[instrument(skip_all, fields(branch = %self.settings.branch))]
    pub async fn run(&self) -> Result<PublishOutcome> {
        info!("running changelog update");

        self.ensure_working_copy().await?;

        trace!("ensuring we're on the correct branch");
        self.vcs.checkout(&self.settings.branch).await?;

        trace!("pulling repo");
        self.pull().await?;

        for target in &self.settings.targets {
            self.compactor
                .compact(
                    &target.document,
                    &self.settings.parts_dir,
                    target.category.as_deref(),
                )
                .await?;
        }

        trace!("checking status");
        let status = self.vcs.status().await?;
        if status.trim().is_empty() {
            debug!("no files changed, no commit needed");
            return Ok(PublishOutcome::NoChanges);
        }

        trace!("committing");
        self.vcs.add(&self.settings.stage).await?;
        self.vcs
            .commit(&self.settings.message, &self.settings.identity)
            .await?;

        self.push_with_retry().await
    }

    async fn ensure_working_copy(&self) -> Result<()> {
        if self.vcs.has_working_copy() {
            trace!(repo = %self.settings.repo.display(), "working copy present");
            return Ok(());
        }

        let remote = self.settings.remote.as_deref().ok_or_else(|| {
            ChangelogError::config("working copy missing and repo.remote is not set")
        })?;

        info!(remote, repo = %self.settings.repo.display(), "working copy missing, cloning");
        self.vcs
            .clone_into(remote, &self.settings.repo, self.settings.network_timeout)
            .await
    }

    async fn pull(&self) -> Result<()> {
        self.vcs
            .pull_rebase(&self.settings.identity, self.settings.network_timeout)
            .await
    }

    /// A push that loses a race is retried after pulling again.
    async fn push_with_retry(&self) -> Result<PublishOutcome> {
        for attempt in 1..=MAX_PUSH_ATTEMPTS {
            if attempt > 1 {
                info!(attempt, "pulling before retrying push");
                self.pull().await?;
            }

            info!(attempt, "pushing");
            match self
                .vcs
                .push(PUSH_REMOTE, self.settings.network_timeout)
                .await
            {
                Ok(()) => return Ok(PublishOutcome::Pushed { attempts: attempt }),
                Err(e) if e.is_process_failure() => {
                    warn!(attempt, error = %e, "push failed");
                }
                Err(e) => return Err(e),
            }
        }

        error!(attempts = MAX_PUSH_ATTEMPTS, "push failed too many times, giving up");
        Ok(PublishOutcome::PushAbandoned {
            attempts: MAX_PUSH_ATTEMPTS,
        })
    }
}

#[async_trait]
impl<V: Vcs, C: Compactor> Publisher for PublishSequence<V, C> {
    async fn publish(&self) -> Result<PublishOutcome> {
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Scriptable VCS that records every call.
    #[derive(Clone, Default)]
    struct FakeVcs {
        calls: Arc<Mutex<Vec<String>>>,
        cloned: bool,
        status: String,
        /// Number of leading push calls that fail.
        push_failures: u32,
        /// 1-based pull call that fails, if any.
        fail_pull_on: Option<usize>,
        fail_checkout: bool,
        fail_clone: bool,
    }

    impl FakeVcs {
        fn record(&self, call: impl Into<String>) -> usize {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.into());
            calls.len()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Vcs for FakeVcs {
        fn has_working_copy(&self) -> bool {
            self.cloned
        }

        async fn clone_into(&self, remote: &str, _dest: &Path, timeout: Duration) -> Result<()> {
            self.record(format!("clone {remote} ({}s)", timeout.as_secs()));
            if self.fail_clone {
                return Err(ChangelogError::Timeout {
                    command: format!("git clone {remote} ."),
                    secs: timeout.as_secs(),
                });
            }
            Ok(())
        }

        async fn checkout(&self, branch: &str) -> Result<()> {
            self.record(format!("checkout {branch}"));
            if self.fail_checkout {
                return Err(ChangelogError::process("git checkout", "exit status: 1"));
            }
            Ok(())
        }

        async fn pull_rebase(&self, _identity: &CommitIdentity, _timeout: Duration) -> Result<()> {
            self.record("pull");
            if self.fail_pull_on == Some(self.count("pull")) {
                return Err(ChangelogError::Timeout {
                    command: "git pull --rebase".into(),
                    secs: 30,
                });
            }
            Ok(())
        }

        async fn status(&self) -> Result<String> {
            self.record("status");
            Ok(self.status.clone())
        }

        async fn add(&self, paths: &[PathBuf]) -> Result<()> {
            self.record(format!("add {}", paths[0].display()));
            Ok(())
        }

        async fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<()> {
            self.record(format!(
                "commit {message} by {}",
                identity.name.as_deref().unwrap_or("-")
            ));
            Ok(())
        }

        async fn push(&self, remote: &str, _timeout: Duration) -> Result<()> {
            let n = self.count("push") as u32 + 1;
            self.record(format!("push {remote}"));
            if n <= self.push_failures {
                return Err(ChangelogError::process("git push origin", "rejected"));
            }
            Ok(())
        }
    }

    /// Compactor that records its invocations.
    #[derive(Clone, Default)]
    struct FakeCompactor {
        runs: Arc<Mutex<Vec<(PathBuf, Option<String>)>>>,
    }

    #[async_trait]
    impl Compactor for FakeCompactor {
        async fn compact(
            &self,
            document: &Path,
            _parts_dir: &Path,
            category: Option<&str>,
        ) -> Result<()> {
            self.runs
                .lock()
                .unwrap()
                .push((document.to_path_buf(), category.map(String::from)));
            Ok(())
        }
    }

    fn settings() -> PublishSettings {
        let mut config = AppConfig::default();
        config.repo.path = "/srv/cl".into();
        config.repo.remote = Some("git@example.com:org/game.git".into());
        config.commit.author_name = Some("Bot".into());
        config.publish.extra_categories = vec!["Admin".into()];
        PublishSettings::from(&config)
    }

    fn dirty_vcs() -> FakeVcs {
        FakeVcs {
            cloned: true,
            status: " M Resources/Changelog/Changelog.yml\n".into(),
            ..FakeVcs::default()
        }
    }

    #[test]
    fn settings_from_config() {
        let s = settings();
        assert_eq!(s.branch, "master");
        assert_eq!(s.stage, vec![PathBuf::from("Resources/Changelog")]);
        assert_eq!(s.network_timeout, Duration::from_secs(30));
        assert_eq!(
            s.targets,
            vec![
                CompactionTarget {
                    document: PathBuf::from("/srv/cl/Resources/Changelog/Changelog.yml"),
                    category: None,
                },
                CompactionTarget {
                    document: PathBuf::from("/srv/cl/Resources/Changelog/Admin.yml"),
                    category: Some("Admin".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn full_cycle_in_order() {
        let vcs = dirty_vcs();
        let compactor = FakeCompactor::default();
        let seq = PublishSequence::new(vcs.clone(), compactor.clone(), settings());

        let outcome = seq.run().await.unwrap();
        assert_eq!(outcome, PublishOutcome::Pushed { attempts: 1 });
        assert_eq!(
            vcs.log(),
            vec![
                "checkout master",
                "pull",
                "status",
                "add Resources/Changelog",
                "commit Automatic changelog update by Bot",
                "push origin",
            ]
        );
        assert_eq!(compactor.runs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clones_when_working_copy_missing() {
        let vcs = FakeVcs {
            cloned: false,
            ..dirty_vcs()
        };
        let seq = PublishSequence::new(vcs.clone(), FakeCompactor::default(), settings());
        seq.run().await.unwrap();
        assert_eq!(vcs.log()[0], "clone git@example.com:org/game.git (30s)");
    }

    #[tokio::test]
    async fn clone_timeout_aborts_cycle() {
        let vcs = FakeVcs {
            cloned: false,
            fail_clone: true,
            ..dirty_vcs()
        };
        let compactor = FakeCompactor::default();
        let seq = PublishSequence::new(vcs.clone(), compactor.clone(), settings());

        let err = seq.run().await.unwrap_err();
        assert!(matches!(err, ChangelogError::Timeout { secs: 30, .. }));
        assert_eq!(vcs.log(), vec!["clone git@example.com:org/game.git (30s)"]);
        assert!(compactor.runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_working_copy_without_remote_is_fatal() {
        let vcs = FakeVcs {
            cloned: false,
            ..dirty_vcs()
        };
        let mut s = settings();
        s.remote = None;
        let seq = PublishSequence::new(vcs.clone(), FakeCompactor::default(), s);

        let err = seq.run().await.unwrap_err();
        assert!(matches!(err, ChangelogError::Config { .. }));
        assert!(vcs.log().is_empty());
    }

    #[tokio::test]
    async fn clean_working_copy_skips_commit_and_push() {
        let vcs = FakeVcs {
            status: "\n".into(),
            ..dirty_vcs()
        };
        let compactor = FakeCompactor::default();
        let seq = PublishSequence::new(vcs.clone(), compactor.clone(), settings());

        assert_eq!(seq.run().await.unwrap(), PublishOutcome::NoChanges);
        assert_eq!(vcs.log(), vec!["checkout master", "pull", "status"]);
        assert_eq!(compactor.runs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn push_retries_with_pull_between_attempts() {
        let vcs = FakeVcs {
            push_failures: 2,
            ..dirty_vcs()
        };
        let seq = PublishSequence::new(vcs.clone(), FakeCompactor::default(), settings());

        assert_eq!(
            seq.run().await.unwrap(),
            PublishOutcome::Pushed { attempts: 3 }
        );
        let log = vcs.log();
        let tail: Vec<&str> = log[5..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["push origin", "pull", "push origin", "pull", "push origin"]
        );
    }

    #[tokio::test]
    async fn push_gives_up_after_three_attempts() {
        let vcs = FakeVcs {
            push_failures: 10,
            ..dirty_vcs()
        };
        let seq = PublishSequence::new(vcs.clone(), FakeCompactor::default(), settings());

        let outcome = seq.run().await.unwrap();
        assert_eq!(outcome, PublishOutcome::PushAbandoned { attempts: 3 });
        assert_eq!(vcs.count("push"), 3);
        // initial sync plus one before each retry
        assert_eq!(vcs.count("pull"), 3);
    }

    #[tokio::test]
    async fn failed_resync_aborts_cycle() {
        let vcs = FakeVcs {
            push_failures: 10,
            fail_pull_on: Some(2),
            ..dirty_vcs()
        };
        let seq = PublishSequence::new(vcs.clone(), FakeCompactor::default(), settings());

        let err = seq.run().await.unwrap_err();
        assert!(matches!(err, ChangelogError::Timeout { .. }));
        assert_eq!(vcs.count("push"), 1);
    }

    #[tokio::test]
    async fn step_failure_aborts_before_compaction() {
        let vcs = FakeVcs {
            fail_checkout: true,
            ..dirty_vcs()
        };
        let compactor = FakeCompactor::default();
        let seq = PublishSequence::new(vcs.clone(), compactor.clone(), settings());

        assert!(seq.run().await.is_err());
        assert!(compactor.runs.lock().unwrap().is_empty());
        assert_eq!(vcs.log(), vec!["checkout master"]);
    }
}
