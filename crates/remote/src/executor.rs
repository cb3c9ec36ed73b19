//! Remote executor capability

use async_trait::async_trait;
use std::path::Path;

use sitesweep_common::Credentials;

use crate::error::{RemoteError, RemoteResult};

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the command was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Opens sessions against a site's host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// One authenticated connection
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command`, optionally from `cwd`. A non-zero exit is not an error
    /// here; callers decide through [`CommandOutput::exit_code`].
    async fn run(&mut self, command: &str, cwd: Option<&str>) -> RemoteResult<CommandOutput>;

    /// Copy `remote_path` to `local_path`
    async fn transfer_file(&mut self, remote_path: &str, local_path: &Path) -> RemoteResult<()>;

    async fn close(self: Box<Self>) -> RemoteResult<()>;
}

/// Run a command and turn a non-zero exit into [`RemoteError::CommandFailed`]
pub async fn run_checked(
    session: &mut dyn RemoteSession,
    command: &str,
    cwd: Option<&str>,
) -> RemoteResult<CommandOutput> {
    let output = session.run(command, cwd).await?;
    if !output.success() {
        return Err(RemoteError::CommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
