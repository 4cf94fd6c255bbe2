// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::config::ValidationErrors;
use crate::external::ToolError;
use crate::port::PortConflict;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(stackup::config::error))]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(
        code(stackup::config::validation),
        help("Fix the listed manifest entries and run `stackup validate` again")
    )]
    Validation(ValidationErrors),

    #[error("Unknown technology '{0}'")]
    #[diagnostic(
        code(stackup::provisioning::unknown_technology),
        help("Supported technologies: postgresql, redis, nats, centrifugo, temporal")
    )]
    UnknownTechnology(String),

    #[error("Invalid reference path '{path}': {reason}")]
    #[diagnostic(
        code(stackup::reference::invalid_path),
        help("Reference paths look like components.<name>.middlewareDependencies.<name>.endpoint")
    )]
    InvalidReferencePath { path: String, reason: String },

    #[error("Provisioning failed during {stage}: {message}")]
    #[diagnostic(code(stackup::provisioning::failed))]
    Provisioning { stage: String, message: String },

    #[error("External tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Namespace '{namespace}' already has a live deployment ({})", .deployments.join(", "))]
    #[diagnostic(
        code(stackup::preflight::deployment_exists),
        help("Run `stackup destroy` first, or re-run with `stackup deploy --force`")
    )]
    DeploymentExists {
        namespace: String,
        deployments: Vec<String>,
    },

    #[error("Local ports already in use:\n{}", .0.iter().map(|c| format!("  - {}", c)).collect::<Vec<_>>().join("\n"))]
    #[diagnostic(
        code(stackup::port::occupied),
        help("Stop the listed processes, then run `stackup port-forward` again")
    )]
    PortsOccupied(Vec<PortConflict>),

    #[error("Port allocation failed: {0}")]
    PortAllocation(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Another stackup run is in progress for {0}")]
    #[diagnostic(code(stackup::state::locked))]
    Locked(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a failure reported by an external tool during a pipeline stage.
    pub fn provisioning(stage: impl ToString, message: impl ToString) -> Self {
        Error::Provisioning {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::DeploymentExists { namespace, .. } => Some(format!(
                "Namespace '{}' is already deployed. Destroy it first with `stackup destroy`, or re-run with `stackup deploy --force`.",
                namespace
            )),
            Error::PortsOccupied(conflicts) => {
                let ports: Vec<String> = conflicts.iter().map(|c| c.port.to_string()).collect();
                Some(format!(
                    "Find the owners with `lsof -i :<port>` (ports: {}), stop them, then run `stackup port-forward`.",
                    ports.join(", ")
                ))
            }
            Error::Validation(_) => Some(
                "Compare your deploy.<env>.json against the application manifest: every declared dependency needs a deployment entry.".to_string(),
            ),
            Error::UnknownTechnology(id) => Some(format!(
                "'{}' has no provisioning strategy; it will be deployed with the generic strategy if referenced via `use`.",
                id
            )),
            Error::Provisioning { stage, .. } => Some(format!(
                "The run stopped at stage '{}'. Fix the error above and re-run; completed stages are persisted.",
                stage
            )),
            Error::Tool(ToolError::ExecFailed { command, .. }) => Some(format!(
                "Make sure the binary for '{}' is installed and on your PATH.",
                command
            )),
            Error::Locked(_) => Some(
                "Wait for the other run to finish. If no other run is active, remove the stale .stackup/<env>/.lock file.".to_string(),
            ),
            Error::Config(_) | Error::Parse(_) => {
                Some("Validate your manifests with: stackup validate".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
#[cfg(unix)]
pub fn validate_pid(pid: u32, owner: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("PID 0 refers to a process group, not '{}'", owner),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal init on behalf of '{}'", owner),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("PID exceeds i32::MAX for '{}'", owner),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// PID conversion for read-only liveness checks. Unlike [`validate_pid`] this
/// accepts PID 1, since nothing is signalled.
#[cfg(unix)]
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}
