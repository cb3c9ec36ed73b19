//! Scripted executor for unit tests

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sitesweep_common::Credentials;

use crate::error::{RemoteError, RemoteResult};
use crate::executor::{CommandOutput, RemoteExecutor, RemoteSession};

/// Answers commands from a list of `(prefix, output)` rules and records
/// everything it was asked to do.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    pub rules: Vec<(String, CommandOutput)>,
    pub refuse_connect: bool,
    pub fail_transfer: bool,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }
    }

    pub fn rule(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push((prefix.to_string(), output));
        self
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

struct ScriptedSession {
    script: ScriptedExecutor,
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn connect(&self, credentials: &Credentials) -> RemoteResult<Box<dyn RemoteSession>> {
        if self.refuse_connect {
            return Err(RemoteError::Connect {
                host: credentials.host.clone(),
                reason: "refused".to_string(),
            });
        }
        self.log.lock().unwrap().push("connect".to_string());
        Ok(Box::new(ScriptedSession {
            script: self.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &str, cwd: Option<&str>) -> RemoteResult<CommandOutput> {
        let entry = match cwd {
            Some(dir) => format!("[{}] {}", dir, command),
            None => command.to_string(),
        };
        self.script.log.lock().unwrap().push(entry);

        Ok(self
            .script
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ScriptedExecutor::ok("")))
    }

    async fn transfer_file(&mut self, remote_path: &str, local_path: &Path) -> RemoteResult<()> {
        self.script
            .log
            .lock()
            .unwrap()
            .push(format!("transfer {}", remote_path));
        if self.script.fail_transfer {
            return Err(RemoteError::Transfer {
                remote_path: remote_path.to_string(),
                reason: "no such file".to_string(),
            });
        }
        tokio::fs::write(local_path, b"PK").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> RemoteResult<()> {
        self.script.log.lock().unwrap().push("close".to_string());
        Ok(())
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        host: "ssh.example.com".into(),
        port: 22,
        username: "deploy".into(),
        password: None,
        private_key: None,
        path: "/var/www/site".into(),
    }
}
