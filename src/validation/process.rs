//! External tool invocation

use crate::config::CommandSpec;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured output of a finished tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, verbatim
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Run `spec` in `cwd` to completion.
///
/// On unix the tool leads its own process group. The whole group is killed
/// when this returns or when the returned future is dropped, so racing this
/// against a timeout or cancellation leaves no descendant running.
pub async fn run_command(spec: &CommandSpec, cwd: &Path) -> Result<CommandOutput> {
    tracing::debug!(command = %spec.display(), cwd = %cwd.display(), "spawning tool");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", spec.display()))?;
    let _group = ProcessGroup::new(child.id());
    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed to wait for `{}`", spec.display()))?;

    let result = CommandOutput {
        exit_code: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    tracing::debug!(
        command = %spec.display(),
        exit_code = ?result.exit_code,
        stdout_bytes = result.stdout.len(),
        stderr_bytes = result.stderr.len(),
        "tool finished"
    );
    Ok(result)
}

/// Kills every process left in a tool's process group on drop
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { leader }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(leader) = self.leader {
            kill_group(leader);
        }
    }
}

#[cfg(unix)]
fn kill_group(leader: u32) {
    let Ok(pgid) = libc::pid_t::try_from(leader) else {
        return;
    };
    // SAFETY: killpg only signals the group; an emptied group yields ESRCH.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        tracing::debug!(pgid, "killed tool process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}
