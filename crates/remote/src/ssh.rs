//! OpenSSH remote executor
//!
//! Each session starts an `ssh -M` control master in the background and
//! multiplexes every command and `scp` transfer over its control socket, so
//! authentication happens once per session. Password credentials go through
//! `sshpass -e`; key credentials run in batch mode.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use sitesweep_common::{Credentials, RemoteConfig};

use crate::error::{RemoteError, RemoteResult};
use crate::executor::{shell_quote, CommandOutput, RemoteExecutor, RemoteSession};

/// How long a closing master gets before it is killed
const MASTER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Executor backed by the system `ssh` and `scp` binaries
#[derive(Debug, Clone)]
pub struct OpenSshExecutor {
    ssh_program: String,
    scp_program: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl OpenSshExecutor {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            connect_timeout,
            command_timeout,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.connect_timeout(), config.command_timeout())
    }

    /// Use other `ssh`/`scp` binaries
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    /// Build the control master command for `credentials`
    fn master_command(&self, credentials: &Credentials, control_path: &Path) -> Command {
        let use_password = credentials.password.is_some() && credentials.private_key.is_none();

        let mut cmd = if use_password {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg(&self.ssh_program);
            if let Some(password) = &credentials.password {
                cmd.env("SSHPASS", password);
            }
            cmd
        } else {
            Command::new(&self.ssh_program)
        };

        cmd.arg("-M")
            .arg("-N")
            .arg("-S")
            .arg(control_path)
            .arg("-p")
            .arg(credentials.port.to_string())
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ServerAliveInterval=30");

        if use_password {
            cmd.arg("-o").arg("PubkeyAuthentication=no");
        } else {
            cmd.arg("-o").arg("BatchMode=yes");
        }
        if let Some(key) = &credentials.private_key {
            cmd.arg("-i").arg(key);
        }

        cmd.arg(target(credentials))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    async fn connect(&self, credentials: &Credentials) -> RemoteResult<Box<dyn RemoteSession>> {
        let control_dir = tempfile::Builder::new().prefix("sitesweep-ssh").tempdir()?;
        let control_path = control_dir.path().join("ctl");

        debug!("Opening SSH master to {}:{}", credentials.host, credentials.port);

        let master = self
            .master_command(credentials, &control_path)
            .spawn()
            .map_err(|e| RemoteError::Connect {
                host: credentials.host.clone(),
                reason: format!("failed to spawn {}: {}", self.ssh_program, e),
            })?;

        let mut session = OpenSshSession {
            master,
            _control_dir: control_dir,
            control_path,
            target: target(credentials),
            host: credentials.host.clone(),
            port: credentials.port,
            ssh_program: self.ssh_program.clone(),
            scp_program: self.scp_program.clone(),
            command_timeout: self.command_timeout,
        };

        // Allow the master its own ConnectTimeout plus a margin for auth
        session.wait_for_master(self.connect_timeout * 2).await?;
        Ok(Box::new(session))
    }
}

/// One control master and the commands multiplexed over it
pub struct OpenSshSession {
    master: Child,
    _control_dir: TempDir,
    control_path: PathBuf,
    target: String,
    host: String,
    port: u16,
    ssh_program: String,
    scp_program: String,
    command_timeout: Duration,
}

impl OpenSshSession {
    /// Wait until the control socket accepts clients or the master exits
    async fn wait_for_master(&mut self, limit: Duration) -> RemoteResult<()> {
        let start = Instant::now();

        while start.elapsed() < limit {
            if let Some(status) = self.master.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = self.master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(RemoteError::Connect {
                    host: self.host.clone(),
                    reason: format!("ssh exited with {}: {}", status, stderr.trim()),
                });
            }

            if self.control_path.exists() && self.check_master().await {
                debug!("SSH master to {} is up", self.host);
                return Ok(());
            }

            sleep(Duration::from_millis(100)).await;
        }

        let _ = self.master.kill().await;
        Err(RemoteError::Timeout {
            what: format!("SSH connection to {}", self.host),
            seconds: limit.as_secs(),
        })
    }

    async fn check_master(&self) -> bool {
        Command::new(&self.ssh_program)
            .arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("check")
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn client_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.ssh_program);
        cmd.arg("-S")
            .arg(&self.control_path)
            .arg("-o")
            .arg("ControlMaster=no")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.target)
            .arg(remote_command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn run(&mut self, command: &str, cwd: Option<&str>) -> RemoteResult<CommandOutput> {
        let remote_command = match cwd {
            Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
            None => command.to_string(),
        };
        trace!("[{}] $ {}", self.host, remote_command);

        let output = timeout(
            self.command_timeout,
            self.client_command(&remote_command).output(),
        )
        .await
        .map_err(|_| RemoteError::Timeout {
            what: command.to_string(),
            seconds: self.command_timeout.as_secs(),
        })??;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        debug!("[{}] '{}' exited with {:?}", self.host, command, result.exit_code);
        Ok(result)
    }

    async fn transfer_file(&mut self, remote_path: &str, local_path: &Path) -> RemoteResult<()> {
        debug!("[{}] Downloading {} to {}", self.host, remote_path, local_path.display());

        let mut cmd = Command::new(&self.scp_program);
        cmd.arg("-q")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-o")
            .arg("ControlMaster=no")
            .arg("-P")
            .arg(self.port.to_string())
            .arg(format!("{}:{}", self.target, remote_path))
            .arg(local_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| RemoteError::Timeout {
                what: format!("transfer of {}", remote_path),
                seconds: self.command_timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(RemoteError::Transfer {
                remote_path: remote_path.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> RemoteResult<()> {
        let _ = Command::new(&self.ssh_program)
            .arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("exit")
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match timeout(MASTER_EXIT_GRACE, self.master.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!("SSH master to {} did not exit; killing it", self.host);
                self.master.kill().await?;
                Ok(())
            }
        }
    }
}

fn target(credentials: &Credentials) -> String {
    format!("{}@{}", credentials.username, credentials.host)
}
