use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{SyncError, SyncOutcome};

/// Runs external commands in an explicit working directory.
///
/// Implementations never change the process-wide current directory, so
/// several invocations can be in flight at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` inside `working_dir`, returning captured stdout
    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> SyncOutcome<String>;
}

/// Spawns real processes through tokio
#[derive(Debug, Clone, Default)]
pub struct GitRunner {
    timeout: Option<Duration>,
}

impl GitRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail any command running longer than `limit`
    pub fn with_timeout(limit: Option<Duration>) -> Self {
        Self { timeout: limit }
    }
}

#[async_trait]
impl CommandRunner for GitRunner {
    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> SyncOutcome<String> {
        let command = command_line(program, args);
        debug!("Running '{}' in {}", command, working_dir.display());

        let failure = |exit: String| SyncError::Process {
            command: command.clone(),
            working_dir: working_dir.to_path_buf(),
            exit,
        };

        let child = AsyncCommand::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => match timeout(limit, child).await {
                Ok(result) => result,
                Err(_) => return Err(failure(format!("timed out after {:?}", limit))),
            },
            None => child.await,
        }
        .map_err(|e| failure(format!("failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {}", c));
            return Err(failure(format!("{}: {}", code, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Render a command for log and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
