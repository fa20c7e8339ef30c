// External command request/result model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::error::DomainError;
use super::priority::Priority;

pub type RequestId = String;

/// Completion callback, invoked exactly once per accepted submission
pub type CommandCallback = Box<dyn FnOnce(CommandResult) + Send + 'static>;

/// What to run: executable, arguments and the hard timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            args,
            timeout,
        }
    }
}

/// A queued request, consumed once dispatched
pub struct CommandRequest {
    pub id: RequestId,
    pub spec: CommandSpec,
    pub priority: Priority,
    pub callback: CommandCallback,
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Runner lifecycle: `Idle -> Running -> {Finished | Errored | TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    Idle,
    Running,
    Finished,
    Errored,
    TimedOut,
}

impl RunnerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunnerState::Finished | RunnerState::Errored | RunnerState::TimedOut
        )
    }

    /// Apply a transition. A runner reaches exactly one terminal state.
    pub fn transition(&mut self, to: RunnerState) -> Result<(), DomainError> {
        let allowed = matches!(
            (*self, to),
            (RunnerState::Idle, RunnerState::Running)
                | (RunnerState::Idle, RunnerState::Errored)
                | (RunnerState::Running, RunnerState::Finished)
                | (RunnerState::Running, RunnerState::Errored)
                | (RunnerState::Running, RunnerState::TimedOut)
        );
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", to),
            });
        }
        *self = to;
        Ok(())
    }

    /// Terminal state matching a finished run
    pub fn terminal_for(result: &CommandResult) -> RunnerState {
        match &result.failure {
            None => RunnerState::Finished,
            Some(CommandError::TimedOut { .. }) => RunnerState::TimedOut,
            Some(_) => RunnerState::Errored,
        }
    }
}

/// Failure taxonomy of an external command
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandError {
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to start process: {0}")]
    SpawnFailed(String),

    #[error("Process crashed: {0}")]
    Crashed(String),

    #[error("Command timed out after {secs} seconds")]
    TimedOut { secs: f64 },

    #[error("Command failed (return code: {code})")]
    NonZeroExit { code: i32 },

    #[error("Command cancelled")]
    Cancelled,
}

/// Immutable outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    /// Non-empty stdout then non-empty stderr, trimmed and newline-joined
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    /// Discrete error text (empty on success)
    pub error: String,
    pub failure: Option<CommandError>,
    /// Only set for `NonZeroExit` (and zero on success)
    pub return_code: Option<i32>,
    pub elapsed: Duration,
    /// Extra interpretation of the return code, if any
    pub hint: Option<String>,
}

impl CommandResult {
    /// Result of a process that exited on its own
    pub fn from_exit(code: i32, stdout: String, stderr: String, elapsed: Duration) -> Self {
        let output = merge_output(&stdout, &stderr);
        if code == 0 {
            return Self {
                success: true,
                output,
                stdout,
                stderr,
                error: String::new(),
                failure: None,
                return_code: Some(0),
                elapsed,
                hint: None,
            };
        }
        Self {
            success: false,
            output,
            error: stderr.trim().to_string(),
            stdout,
            stderr,
            failure: Some(CommandError::NonZeroExit { code }),
            return_code: Some(code),
            elapsed,
            hint: None,
        }
    }

    /// Result of a run that never produced an exit code
    pub fn failed(failure: CommandError, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: merge_output(&stdout, &stderr),
            error: failure.to_string(),
            stdout,
            stderr,
            failure: Some(failure),
            return_code: None,
            elapsed,
            hint: None,
        }
    }

    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::failed(
            CommandError::ExecutableNotFound(path.into()),
            String::new(),
            String::new(),
            Duration::ZERO,
        )
    }

    pub fn cancelled(elapsed: Duration) -> Self {
        Self::failed(CommandError::Cancelled, String::new(), String::new(), elapsed)
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    /// User-facing text: the output on success, a multi-line failure report otherwise
    pub fn message(&self) -> String {
        let failure = match &self.failure {
            None => return self.output.clone(),
            Some(f) => f,
        };

        let mut lines = vec![failure.to_string()];
        if let Some(hint) = &self.hint {
            lines.push(hint.clone());
        }
        if matches!(failure, CommandError::NonZeroExit { .. }) && !self.error.is_empty() {
            lines.push(format!("Error: {}", self.error));
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            lines.push(format!("Output: {}", stdout));
        }
        lines.join("\n")
    }
}

fn merge_output(stdout: &str, stderr: &str) -> String {
    [stdout.trim(), stderr.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}
