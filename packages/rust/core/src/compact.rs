//! Compaction collaborator: folds part records into a consolidated document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use changelog_shared::Result;
use tokio::process::Command;
use tracing::info;

use crate::process::run_checked;

/// Folds the part records in `parts_dir` into `document`.
///
/// `category` is `None` for the default category.
#[async_trait]
pub trait Compactor: Send + Sync {
    async fn compact(&self, document: &Path, parts_dir: &Path, category: Option<&str>)
    -> Result<()>;
}

/// Runs the repository's compaction script as a subprocess.
///
/// Invocation: `<script> <document> <parts_dir> [--category <name>]`.
#[derive(Debug, Clone)]
pub struct ScriptCompactor {
    script: PathBuf,
}

impl ScriptCompactor {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    fn command(&self, document: &Path, parts_dir: &Path, category: Option<&str>) -> Command {
        // Windows cannot execute a script through its shebang.
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("py");
            cmd.arg(&self.script);
            cmd
        } else {
            Command::new(&self.script)
        };

        cmd.arg(document).arg(parts_dir);
        if let Some(category) = category {
            cmd.args(["--category", category]);
        }
        cmd
    }
}

#[async_trait]
impl Compactor for ScriptCompactor {
    async fn compact(
        &self,
        document: &Path,
        parts_dir: &Path,
        category: Option<&str>,
    ) -> Result<()> {
        info!(
            category = category.unwrap_or("default"),
            document = %document.display(),
            "running compaction script"
        );
        run_checked(self.command(document, parts_dir, category), None).await?;
        Ok(())
    }
}
