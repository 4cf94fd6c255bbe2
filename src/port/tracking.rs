//! PID tracking for detached forwarder processes.

use crate::config::EndpointKey;
use crate::error::Result;
use crate::state::{load_json, save_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A detached process started by a run and owned by its tracking file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProcess {
    pub pid: u32,
    /// Executable name, used to tell our process from a recycled PID.
    pub program: String,
    pub endpoint: EndpointKey,
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub started_at: DateTime<Utc>,
}

impl ManagedProcess {
    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        use nix::sys::signal::kill;

        let Some(pid) = crate::error::validate_pid_for_check(self.pid) else {
            return false;
        };
        let exists = match kill(pid, None) {
            Ok(_) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        };
        exists && self.program_matches()
    }

    #[cfg(not(unix))]
    pub fn is_alive(&self) -> bool {
        false
    }

    #[cfg(target_os = "linux")]
    fn program_matches(&self) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/comm", self.pid)) {
            // comm is truncated to 15 bytes
            Ok(comm) => self.program.starts_with(comm.trim()) && !comm.trim().is_empty(),
            Err(_) => true,
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn program_matches(&self) -> bool {
        true
    }

    /// Sends SIGTERM to the process group. Returns `Ok(false)` when the
    /// process was already gone.
    #[cfg(unix)]
    pub fn terminate(&self) -> Result<bool> {
        use nix::sys::signal::{kill, killpg, Signal};

        if !self.is_alive() {
            return Ok(false);
        }
        let pid = crate::error::validate_pid(self.pid, &self.service)?;
        let result = killpg(pid, Signal::SIGTERM).or_else(|_| kill(pid, Signal::SIGTERM));
        match result {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(crate::Error::Io(std::io::Error::from(e))),
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Contents of `port-forward.<namespace>.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingFile {
    pub namespace: String,
    pub processes: Vec<ManagedProcess>,
}

impl TrackingFile {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            processes: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }
}
