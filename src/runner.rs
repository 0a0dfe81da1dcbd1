//! Execution of backend commands.
//!
//! A non-zero exit is an ordinary [`RunOutcome`]. Only failing to start the
//! program or running past the timeout is a [`RunnerError`].

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::BackendSettings;

/// Which command-line backend a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Cloud-infrastructure CLI.
    OpenStack,
    /// Orchestration-layer CLI.
    Kubectl,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::OpenStack => f.pad("openstack"),
            Backend::Kubectl => f.pad("kubectl"),
        }
    }
}

/// A fully rendered backend command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub backend: Backend,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(backend: Backend, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.backend)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    /// Successful outcome with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed outcome with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// One-line description of what went wrong.
    pub fn diagnostic(&self) -> String {
        first_line(&self.stderr)
            .or_else(|| first_line(&self.stdout))
            .map(str::to_string)
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Failure to obtain any outcome from a backend.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The program could not be started (missing binary, permissions).
    #[error("failed to invoke {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time and was killed.
    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Runs one backend command at a time.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command, waiting at most `timeout` for it to finish.
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, RunnerError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, RunnerError> {
        (**self).run(command, timeout).await
    }
}

/// Runs commands as local subprocesses.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    backends: BackendSettings,
}

impl SystemRunner {
    pub fn new(backends: BackendSettings) -> Self {
        Self { backends }
    }

    fn program(&self, backend: Backend) -> &str {
        match backend {
            Backend::OpenStack => &self.backends.openstack,
            Backend::Kubectl => &self.backends.kubectl,
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, RunnerError> {
        let program = self.program(command.backend);
        debug!(program, args = ?command.args, "spawning backend command");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if command.backend == Backend::Kubectl {
            if let Some(kubeconfig) = &self.backends.kubeconfig {
                cmd.env("KUBECONFIG", kubeconfig);
            }
        }

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| RunnerError::Timeout(limit))?,
            None => cmd.output().await,
        }
        .map_err(|source| RunnerError::Spawn {
            program: program.to_string(),
            source,
        })?;

        Ok(RunOutcome {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
