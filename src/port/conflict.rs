//! Detection of local ports held by other processes.

use std::collections::BTreeSet;
use std::fmt;
use std::process::Command;

/// A local port that is already bound, with whatever owners could be identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub port: u16,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl fmt::Display for PortConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.processes.is_empty() {
            return write!(f, "port {} (owner unknown)", self.port);
        }
        let owners: Vec<String> = self
            .processes
            .iter()
            .map(|p| format!("{} (PID {})", p.name, p.pid))
            .collect();
        write!(f, "port {} held by {}", self.port, owners.join(", "))
    }
}

/// Whether `port` can be bound on both loopback and the wildcard address.
///
/// On macOS binding 127.0.0.1 can succeed while 0.0.0.0 is taken, so both are tried.
pub fn is_port_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
        && std::net::TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Every occupied port among `ports`, each listed once in ascending order.
pub fn scan_ports(ports: impl IntoIterator<Item = u16>) -> Vec<PortConflict> {
    let unique: BTreeSet<u16> = ports.into_iter().collect();
    unique
        .into_iter()
        .filter(|port| !is_port_free(*port))
        .map(|port| PortConflict {
            port,
            processes: find_processes(port),
        })
        .collect()
}

fn find_processes(port: u16) -> Vec<ProcessInfo> {
    let mut processes = Vec::new();

    #[cfg(target_os = "linux")]
    if let Some(out) = command_stdout("ss", &["-tlnp", &format!("sport = :{}", port)]) {
        for pid in parse_ss_pids(&out) {
            processes.push(ProcessInfo {
                pid,
                name: proc_name(pid),
            });
        }
    }

    if let Some(out) = command_stdout("lsof", &["-i", &format!(":{}", port), "-P", "-n", "-F", "pc"]) {
        for (pid, name) in parse_lsof(&out) {
            if !processes.iter().any(|p| p.pid == pid) {
                processes.push(ProcessInfo { pid, name });
            }
        }
    }

    processes
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(target_os = "linux")]
fn proc_name(pid: u32) -> String {
    std::fs::read_to_string(format!("/proc/{}/comm", pid))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// PIDs from `ss -tlnp` output (`users:(("name",pid=123,fd=4))`).
pub(crate) fn parse_ss_pids(output: &str) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in output.lines().skip(1) {
        let Some(users) = line.split_whitespace().last() else {
            continue;
        };
        for part in users.split(',') {
            if let Some(pid) = part.strip_prefix("pid=").and_then(|p| p.parse().ok()) {
                if !pids.contains(&pid) {
                    pids.push(pid);
                }
            }
        }
    }
    pids
}

/// `(pid, command)` pairs from `lsof -F pc` output.
pub(crate) fn parse_lsof(output: &str) -> Vec<(u32, String)> {
    let mut found: Vec<(u32, String)> = Vec::new();
    for line in output.lines() {
        if let Some(pid) = line.strip_prefix('p') {
            if let Ok(pid) = pid.parse() {
                found.push((pid, "unknown".to_string()));
            }
        } else if let Some(command) = line.strip_prefix('c') {
            if let Some(last) = found.last_mut() {
                last.1 = command.to_string();
            }
        }
    }
    found.dedup_by_key(|(pid, _)| *pid);
    found
}
