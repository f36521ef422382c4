//! Application configuration for the changelog service.
//!
//! User config lives at `~/.changelog-bot/changelog.toml`.
//! A `--config` flag overrides the location; missing files mean defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChangelogError, Result};
use crate::types::CategorySet;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "changelog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".changelog-bot";

// ---------------------------------------------------------------------------
// Config structs (matching changelog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Working copy and document layout.
    #[serde(default)]
    pub repo: RepoConfig,

    /// Commit identity and credentials.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Debounce and category settings.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// `[repo]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Local working copy of the document repository.
    #[serde(default)]
    pub path: String,

    /// Remote to clone from when the working copy does not exist yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Branch that merged pull requests target and publishes go to.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Output filename of the default-category document.
    #[serde(default = "default_changelog_filename")]
    pub changelog_filename: String,

    /// Directory holding the consolidated documents, relative to `path`.
    #[serde(default = "default_changelog_dir")]
    pub changelog_dir: String,

    /// Directory holding unpublished part records, relative to `path`.
    #[serde(default = "default_parts_dir")]
    pub parts_dir: String,

    /// Compaction script, relative to `path`.
    #[serde(default = "default_script")]
    pub script: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            remote: None,
            branch: default_branch(),
            changelog_filename: default_changelog_filename(),
            changelog_dir: default_changelog_dir(),
            parts_dir: default_parts_dir(),
            script: default_script(),
        }
    }
}

fn default_branch() -> String {
    "master".into()
}
fn default_changelog_filename() -> String {
    "Changelog.yml".into()
}
fn default_changelog_dir() -> String {
    "Resources/Changelog".into()
}
fn default_parts_dir() -> String {
    "Resources/Changelog/Parts".into()
}
fn default_script() -> String {
    "Tools/update_changelog.py".into()
}

impl RepoConfig {
    /// Absolute (or cwd-relative) working copy path.
    pub fn working_copy(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn parts_path(&self) -> PathBuf {
        self.working_copy().join(&self.parts_dir)
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.working_copy().join(&self.changelog_dir)
    }

    pub fn script_path(&self) -> PathBuf {
        self.working_copy().join(&self.script)
    }

    /// The consolidated document a category compacts into.
    ///
    /// The default category uses `changelog_filename`; extras use `<name>.yml`.
    pub fn document_path(&self, categories: &CategorySet, category: &str) -> PathBuf {
        if categories.is_default(category) {
            self.changelog_path().join(&self.changelog_filename)
        } else {
            self.changelog_path().join(format!("{category}.yml"))
        }
    }
}

/// `[commit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Author name override for publish commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    /// Author email override for publish commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,

    /// Private key used for network git operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    /// Commit message of publish commits.
    #[serde(default = "default_commit_message")]
    pub message: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            author_name: None,
            author_email: None,
            ssh_key: None,
            message: default_commit_message(),
        }
    }
}

fn default_commit_message() -> String {
    "Automatic changelog update".into()
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Debounce window in seconds.
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,

    /// Categories recognised in addition to the implicit default.
    #[serde(default)]
    pub extra_categories: Vec<String>,

    /// Time budget for `clone`, `pull --rebase` and `push`.
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            delay_seconds: default_delay_seconds(),
            extra_categories: Vec::new(),
            network_timeout_secs: default_network_timeout(),
        }
    }
}

fn default_delay_seconds() -> u64 {
    60
}
fn default_network_timeout() -> u64 {
    30
}

impl PublishConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

impl AppConfig {
    /// The recognised category set for this configuration.
    pub fn categories(&self) -> CategorySet {
        CategorySet::new(&self.publish.extra_categories)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.changelog-bot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChangelogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.changelog-bot/changelog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChangelogError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ChangelogError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ChangelogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ChangelogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ChangelogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the settings needed for publishing are usable.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.repo.path.trim().is_empty() {
        return Err(ChangelogError::config(
            "repo.path is not set. Point it at the changelog working copy.",
        ));
    }
    if config.repo.branch.trim().is_empty() {
        return Err(ChangelogError::config("repo.branch is not set"));
    }
    // Directive lines only ever match a single run of letters.
    if let Some(bad) = config
        .publish
        .extra_categories
        .iter()
        .find(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
    {
        return Err(ChangelogError::config(format!(
            "extra category {bad:?} must be a single word of letters"
        )));
    }
    Ok(())
}
