//! Version-control collaborator used by the publish cycle.
//!
//! The publish cycle only needs a handful of commands, so the [`Vcs`] trait
//! exposes exactly those. [`SystemGit`] drives the system `git` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use changelog_shared::{ChangelogError, CommitConfig, Result};
use tokio::process::Command;
use tracing::debug;

use crate::process::run_checked;

/// Author identity override for commits (and rebases, which create commits).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<&CommitConfig> for CommitIdentity {
    fn from(config: &CommitConfig) -> Self {
        Self {
            name: config.author_name.clone(),
            email: config.author_email.clone(),
        }
    }
}

/// Minimal command surface of the document repository.
///
/// Every method fails with a process error on non-zero exit or timeout.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Whether the local working copy has been initialised.
    fn has_working_copy(&self) -> bool;

    /// Clone `remote` into `dest`, creating `dest` if needed.
    async fn clone_into(&self, remote: &str, dest: &Path, timeout: Duration) -> Result<()>;

    async fn checkout(&self, branch: &str) -> Result<()>;

    async fn pull_rebase(&self, identity: &CommitIdentity, timeout: Duration) -> Result<()>;

    /// Porcelain status; empty when the working copy is clean.
    async fn status(&self) -> Result<String>;

    async fn add(&self, paths: &[PathBuf]) -> Result<()>;

    async fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<()>;

    async fn push(&self, remote: &str, timeout: Duration) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SystemGit
// ---------------------------------------------------------------------------

/// [`Vcs`] backed by the system `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    /// Working copy root.
    repo: PathBuf,
    /// Private key for network commands.
    ssh_key: Option<String>,
}

impl SystemGit {
    pub fn new(repo: impl Into<PathBuf>, ssh_key: Option<String>) -> Self {
        Self {
            repo: repo.into(),
            ssh_key,
        }
    }

    /// A `git` command rooted at `dir`.
    ///
    /// Prompts are disabled so a credential problem fails instead of hanging.
    /// Network commands also get the configured SSH key.
    fn git_cmd(&self, dir: &Path, network: bool) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir).env("GIT_TERMINAL_PROMPT", "0");

        if network {
            if let Some(key) = &self.ssh_key {
                cmd.env("GIT_SSH_COMMAND", format!("ssh -i \"{key}\""));
            }
        }

        cmd
    }

    /// Global `-c` overrides must precede the subcommand.
    fn with_identity(cmd: &mut Command, identity: &CommitIdentity) {
        if let Some(name) = &identity.name {
            cmd.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &identity.email {
            cmd.arg("-c").arg(format!("user.email={email}"));
        }
    }
}

#[async_trait]
impl Vcs for SystemGit {
    fn has_working_copy(&self) -> bool {
        self.repo.join(".git").is_dir()
    }

    async fn clone_into(&self, remote: &str, dest: &Path, timeout: Duration) -> Result<()> {
        std::fs::create_dir_all(dest).map_err(|e| ChangelogError::io(dest, e))?;
        let mut cmd = self.git_cmd(dest, true);
        cmd.args(["clone", remote, "."]);
        run_checked(cmd, Some(timeout)).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        let mut cmd = self.git_cmd(&self.repo, false);
        cmd.args(["checkout", branch]);
        run_checked(cmd, None).await?;
        Ok(())
    }

    async fn pull_rebase(&self, identity: &CommitIdentity, timeout: Duration) -> Result<()> {
        let mut cmd = self.git_cmd(&self.repo, true);
        Self::with_identity(&mut cmd, identity);
        cmd.args(["pull", "--rebase"]);
        run_checked(cmd, Some(timeout)).await?;
        Ok(())
    }

    async fn status(&self) -> Result<String> {
        let mut cmd = self.git_cmd(&self.repo, false);
        cmd.args(["status", "--porcelain"]);
        let out = run_checked(cmd, None).await?;
        Ok(out.stdout)
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<()> {
        let mut cmd = self.git_cmd(&self.repo, false);
        cmd.arg("add").args(paths);
        run_checked(cmd, None).await?;
        Ok(())
    }

    async fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<()> {
        let mut cmd = self.git_cmd(&self.repo, false);
        Self::with_identity(&mut cmd, identity);
        cmd.args(["commit", "-m", message]);
        run_checked(cmd, None).await?;
        Ok(())
    }

    async fn push(&self, remote: &str, timeout: Duration) -> Result<()> {
        let mut cmd = self.git_cmd(&self.repo, true);
        cmd.args(["push", remote]);
        run_checked(cmd, Some(timeout)).await?;
        debug!(remote, "push succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn env(cmd: &Command, key: &str) -> Option<String> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.map(|v| v.to_string_lossy().into_owned()))
    }

    #[test]
    fn identity_precedes_subcommand() {
        let git = SystemGit::new("/srv/cl", None);
        let mut cmd = git.git_cmd(Path::new("/srv/cl"), false);
        SystemGit::with_identity(
            &mut cmd,
            &CommitIdentity {
                name: Some("Bot".into()),
                email: Some("bot@example.com".into()),
            },
        );
        cmd.args(["commit", "-m", "msg"]);

        assert_eq!(
            args(&cmd),
            vec![
                "-c",
                "user.name=Bot",
                "-c",
                "user.email=bot@example.com",
                "commit",
                "-m",
                "msg"
            ]
        );
    }

    #[test]
    fn network_commands_carry_ssh_key() {
        let git = SystemGit::new("/srv/cl", Some("/keys/id".into()));

        let net = git.git_cmd(Path::new("/srv/cl"), true);
        assert_eq!(env(&net, "GIT_SSH_COMMAND").as_deref(), Some("ssh -i \"/keys/id\""));
        assert_eq!(env(&net, "GIT_TERMINAL_PROMPT").as_deref(), Some("0"));

        let local = git.git_cmd(Path::new("/srv/cl"), false);
        assert!(env(&local, "GIT_SSH_COMMAND").is_none());
        assert_eq!(env(&local, "GIT_TERMINAL_PROMPT").as_deref(), Some("0"));
    }

    #[test]
    fn working_copy_detection() {
        let dir = tempfile::tempdir().unwrap();
        let git = SystemGit::new(dir.path(), None);
        assert!(!git.has_working_copy());

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(git.has_working_copy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn status_and_commit_against_real_git() {
        if std::process::Command::new("git").arg("--version").output().is_err() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let git = SystemGit::new(dir.path(), None);
        let mut init = git.git_cmd(dir.path(), false);
        init.args(["init", "-q"]);
        run_checked(init, None).await.unwrap();

        assert!(git.status().await.unwrap().trim().is_empty());

        std::fs::write(dir.path().join("Changelog.yml"), "Entries: []\n").unwrap();
        assert!(!git.status().await.unwrap().trim().is_empty());

        let identity = CommitIdentity {
            name: Some("Test Bot".into()),
            email: Some("bot@example.com".into()),
        };
        git.add(&[PathBuf::from("Changelog.yml")]).await.unwrap();
        git.commit("Automatic changelog update", &identity)
            .await
            .unwrap();
        assert!(git.status().await.unwrap().trim().is_empty());
    }
}
