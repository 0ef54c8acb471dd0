use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{CopyError, Result};

/// Captured result of one remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Turn a non-zero exit into `CommandFailed`.
    pub fn check(self) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(CopyError::CommandFailed {
                code: self.exit_code,
                stderr: self.stderr_lossy(),
            })
        }
    }
}

/// Runs one command against the remote host.
///
/// An `Err` means the transport itself failed; a command that ran and
/// exited non-zero is still `Ok` with the code in `exit_code`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Executes commands by handing them to a launcher program as the final
/// argument: `sh -c <cmd>` locally, or `ssh host <cmd>` for a remote shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    program: String,
    args: Vec<String>,
    deadline: Option<Duration>,
}

impl ShellExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            deadline: None,
        }
    }

    /// Run through the local `sh`.
    pub fn local() -> Self {
        Self::new("sh", vec!["-c".to_string()])
    }

    /// Build from a launcher string such as `"ssh -p 2222 deploy@host"`.
    pub fn from_launcher(launcher: &str) -> Result<Self> {
        let mut words = launcher.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| CopyError::Config("empty launcher command".into()))?;
        Ok(Self::new(program, words.collect()))
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let fut = cmd.output();
        let output = match self.deadline {
            Some(d) => match timeout(d, fut).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(CopyError::Transport(format!(
                        "command timed out after {} ms",
                        d.as_millis()
                    )))
                }
            },
            None => fut.await,
        }
        .map_err(|e| CopyError::Transport(format!("spawn {}: {}", self.program, e)))?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            // Killed by a signal: no code, report as failure
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_captures_output_and_code() {
        let exec = ShellExecutor::local();
        let out = exec.run("printf hi; printf oops >&2; exit 3").await.unwrap();
        assert_eq!(out.stdout, b"hi");
        assert_eq!(out.stderr_lossy(), "oops");
        assert_eq!(out.exit_code, 3);
        assert!(matches!(
            out.check(),
            Err(CopyError::CommandFailed { code: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_deadline_maps_to_transport_error() {
        let exec = ShellExecutor::local().with_deadline(Some(Duration::from_millis(100)));
        let err = exec.run("sleep 5").await.unwrap_err();
        assert!(matches!(err, CopyError::Transport(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_transport_error() {
        let exec = ShellExecutor::new("/nonexistent/launcher", vec![]);
        assert!(matches!(
            exec.run("true").await,
            Err(CopyError::Transport(_))
        ));
    }

    #[test]
    fn test_from_launcher() {
        let exec = ShellExecutor::from_launcher("ssh -p 2222 deploy@host").unwrap();
        assert_eq!(exec.program, "ssh");
        assert_eq!(exec.args, vec!["-p", "2222", "deploy@host"]);
        assert!(ShellExecutor::from_launcher("   ").is_err());
    }
}
