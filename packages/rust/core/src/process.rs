//! External command execution with captured output and optional time budget.

use std::process::Stdio;
use std::time::Duration;

use changelog_shared::{ChangelogError, Result};
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `cmd` to completion and fail unless it exits with status zero.
///
/// When `timeout` elapses the child is killed and [`ChangelogError::Timeout`]
/// is returned. Dropping the returned future also kills the child.
pub async fn run_checked(mut cmd: Command, timeout: Option<Duration>) -> Result<CommandOutput> {
    let label = describe(&cmd);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| ChangelogError::process(&label, format!("failed to spawn: {e}")))?;

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(waited) => waited,
            Err(_) => {
                warn!(command = %label, secs = limit.as_secs(), "command timed out, killed");
                return Err(ChangelogError::Timeout {
                    command: label,
                    secs: limit.as_secs(),
                });
            }
        },
        None => child.wait_with_output().await,
    };

    let output =
        waited.map_err(|e| ChangelogError::process(&label, format!("failed to wait: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    debug!(
        command = %label,
        code = ?output.status.code(),
        stdout = %stdout.trim_end(),
        stderr = %stderr.trim_end(),
        "command exited"
    );

    if !output.status.success() {
        return Err(ChangelogError::process(
            label,
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Human-readable `program arg arg ...` rendering for logs and errors.
fn describe(cmd: &Command) -> String {
    let inner = cmd.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
