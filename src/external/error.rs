use std::fmt;
use std::time::Duration;

/// Failure of an external command (`kubectl`, `terraform`).
#[derive(Debug)]
pub enum ToolError {
    /// The command did not finish in time.
    Timeout { command: String, timeout: Duration },

    /// The command ran but exited non-zero. `stderr` is kept verbatim.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// The command succeeded but printed something we could not read.
    UnexpectedOutput { command: String, reason: String },
}

impl ToolError {
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        ToolError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// Command-failed error from an `std::process::Output`.
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        ToolError::CommandFailed {
            command: cmd.into(),
            stderr,
            exit_code: output.status.code(),
        }
    }

    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        ToolError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }

    pub fn unexpected(cmd: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::UnexpectedOutput {
            command: cmd.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Timeout { command, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    command,
                    timeout.as_secs()
                )
            }
            ToolError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                if let Some(code) = exit_code {
                    write!(f, "'{}' failed (exit code {}): {}", command, code, stderr)
                } else {
                    write!(f, "'{}' failed: {}", command, stderr)
                }
            }
            ToolError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
            ToolError::UnexpectedOutput { command, reason } => {
                write!(f, "Unexpected output from '{}': {}", command, reason)
            }
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
