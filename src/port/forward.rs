//! `kubectl port-forward` orchestration.
//!
//! One detached forwarder per exposed endpoint, each in its own process group
//! so it outlives the run. The tracking file is the only handle kept on them.

use super::allocator::PortAllocator;
use super::conflict::scan_ports;
use super::tracking::{ManagedProcess, TrackingFile};
use crate::artifact::{ArtifactGenerator, Exposure};
use crate::config::{EndpointKey, ResolvedConfiguration};
use crate::error::{Error, Result};
use crate::external::ClusterControl;
use crate::provisioning::StrategyRegistry;
use crate::state::RunPaths;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ForwardOptions {
    pub readiness_attempts: u32,
    pub readiness_interval: Duration,
    /// Bound on concurrent readiness waits and port probes.
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub probe_attempts: u32,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            readiness_attempts: 60,
            readiness_interval: Duration::from_secs(1),
            concurrency: 8,
            probe_timeout: Duration::from_millis(500),
            probe_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedPort {
    pub endpoint: EndpointKey,
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
}

/// Local ports assigned to cluster endpoints by one setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub namespace: String,
    pub forwards: Vec<ForwardedPort>,
}

impl PortMapping {
    pub fn local_port(&self, key: &EndpointKey) -> Option<u16> {
        self.forwards
            .iter()
            .find(|f| &f.endpoint == key)
            .map(|f| f.local_port)
    }

    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }
}

pub struct PortForwardManager<'a> {
    cluster: &'a dyn ClusterControl,
    registry: &'a StrategyRegistry,
    paths: &'a RunPaths,
    options: ForwardOptions,
}

impl<'a> PortForwardManager<'a> {
    pub fn new(
        cluster: &'a dyn ClusterControl,
        registry: &'a StrategyRegistry,
        paths: &'a RunPaths,
    ) -> Self {
        Self {
            cluster,
            registry,
            paths,
            options: ForwardOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ForwardOptions) -> Self {
        self.options = options;
        self
    }

    /// Forwards every exposed endpoint of `config` to a local port.
    pub async fn setup(&self, config: &ResolvedConfiguration) -> Result<PortMapping> {
        let namespace = config.namespace.as_str();
        let exposures = ArtifactGenerator::new(self.registry).exposures(config)?;
        if exposures.is_empty() {
            tracing::info!("No container endpoints to forward");
            return Ok(PortMapping {
                namespace: namespace.to_string(),
                forwards: Vec::new(),
            });
        }

        let conflicts = scan_ports(exposures.iter().map(|e| e.target_port));
        if !conflicts.is_empty() {
            return Err(Error::PortsOccupied(conflicts));
        }

        let allocator = PortAllocator::new();
        let mut planned = Vec::with_capacity(exposures.len());
        for exposure in &exposures {
            let local = allocator.allocate(exposure.target_port)?;
            planned.push((exposure, local));
        }

        self.wait_for_workloads(namespace, &exposures).await;

        let forwards = self.spawn_forwarders(namespace, &planned)?;
        self.probe(&forwards).await;

        for forward in &forwards {
            tracing::info!(
                "{} -> localhost:{}",
                forward.endpoint,
                forward.local_port
            );
        }
        Ok(PortMapping {
            namespace: namespace.to_string(),
            forwards,
        })
    }

    /// Stops every tracked forwarder of `namespace`. Returns how many were running.
    pub fn teardown(&self, namespace: &str) -> Result<usize> {
        let path = self.paths.port_forward(namespace);
        let Some(tracking) = TrackingFile::load(&path)? else {
            return Ok(0);
        };
        let mut stopped = 0;
        for process in &tracking.processes {
            match process.terminate() {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    "Could not stop forwarder for {} (PID {}): {}",
                    process.service,
                    process.pid,
                    e
                ),
            }
        }
        std::fs::remove_file(&path)?;
        tracing::debug!("Stopped {} forwarders in {}", stopped, namespace);
        Ok(stopped)
    }

    async fn wait_for_workloads(&self, namespace: &str, exposures: &[Exposure]) {
        let workloads: BTreeSet<&str> = exposures.iter().map(|e| e.workload.as_str()).collect();
        let attempts = self.options.readiness_attempts;
        let interval = self.options.readiness_interval;

        let results: Vec<(&str, bool)> = stream::iter(workloads)
            .map(|workload| async move {
                for attempt in 1..=attempts {
                    match self.cluster.is_workload_ready(namespace, workload).await {
                        Ok(true) => return (workload, true),
                        Ok(false) => {}
                        Err(e) => tracing::debug!(
                            "Readiness check {}/{} for {} failed: {}",
                            attempt,
                            attempts,
                            workload,
                            e
                        ),
                    }
                    if attempt < attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
                (workload, false)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for (workload, ready) in results {
            if !ready {
                tracing::warn!(
                    "{} not ready after {} attempts; forwarding anyway",
                    workload,
                    attempts
                );
            }
        }
    }

    fn spawn_forwarders(
        &self,
        namespace: &str,
        planned: &[(&Exposure, u16)],
    ) -> Result<Vec<ForwardedPort>> {
        let log_dir = self.paths.logs();
        std::fs::create_dir_all(&log_dir)?;

        let mut tracking = TrackingFile::new(namespace);
        let mut forwards = Vec::with_capacity(planned.len());
        let mut result: Result<()> = Ok(());

        for (exposure, local) in planned {
            let mut command = self.cluster.port_forward_command(
                namespace,
                &exposure.service,
                *local,
                exposure.port,
            );
            let program = std::path::Path::new(command.get_program())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let log = match std::fs::File::create(
                log_dir.join(format!("{}-{}.log", exposure.service, local)),
            ) {
                Ok(log) => log,
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            };
            let stderr = match log.try_clone() {
                Ok(stderr) => stderr,
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            };
            command
                .stdin(Stdio::null())
                .stdout(Stdio::from(log))
                .stderr(Stdio::from(stderr));
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                command.process_group(0);
            }

            // The child is not waited on; it outlives this process.
            match command.spawn() {
                Ok(child) => {
                    tracking.processes.push(ManagedProcess {
                        pid: child.id(),
                        program,
                        endpoint: exposure.endpoint.clone(),
                        service: exposure.service.clone(),
                        local_port: *local,
                        remote_port: exposure.port,
                        started_at: Utc::now(),
                    });
                    forwards.push(ForwardedPort {
                        endpoint: exposure.endpoint.clone(),
                        service: exposure.service.clone(),
                        local_port: *local,
                        remote_port: exposure.port,
                    });
                }
                Err(e) => {
                    result = Err(Error::Io(e));
                    break;
                }
            }
        }

        // Whatever was started is tracked, even when a later spawn failed.
        tracking.save(&self.paths.port_forward(namespace))?;
        result.map(|()| forwards)
    }

    async fn probe(&self, forwards: &[ForwardedPort]) {
        let attempts = self.options.probe_attempts.max(1);
        let timeout = self.options.probe_timeout;

        let unreachable: Vec<&ForwardedPort> = stream::iter(forwards)
            .map(|forward| async move {
                for _ in 0..attempts {
                    let connect = tokio::net::TcpStream::connect(("127.0.0.1", forward.local_port));
                    match tokio::time::timeout(timeout, connect).await {
                        Ok(Ok(_)) => return None,
                        _ => tokio::time::sleep(timeout).await,
                    }
                }
                Some(forward)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await;

        for forward in unreachable {
            tracing::warn!(
                "localhost:{} ({}) is not accepting connections yet",
                forward.local_port,
                forward.endpoint
            );
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::resolved_from_json;
    use crate::external::ToolError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct SleepCluster;

    #[async_trait]
    impl ClusterControl for SleepCluster {
        async fn live_deployments(&self, _ns: &str) -> std::result::Result<Vec<String>, ToolError> {
            Ok(Vec::new())
        }
        async fn is_workload_ready(
            &self,
            _ns: &str,
            _deployment: &str,
        ) -> std::result::Result<bool, ToolError> {
            Ok(true)
        }
        async fn rollout_restart(&self, _ns: &str, _d: &str) -> std::result::Result<(), ToolError> {
            Ok(())
        }
        async fn delete_namespace(&self, _ns: &str) -> std::result::Result<(), ToolError> {
            Ok(())
        }
        fn port_forward_command(
            &self,
            _ns: &str,
            _service: &str,
            _local: u16,
            _remote: u16,
        ) -> std::process::Command {
            let mut command = std::process::Command::new("sleep");
            command.arg("30");
            command
        }
    }

    fn options() -> ForwardOptions {
        ForwardOptions {
            readiness_attempts: 1,
            readiness_interval: Duration::from_millis(1),
            concurrency: 4,
            probe_timeout: Duration::from_millis(10),
            probe_attempts: 1,
        }
    }

    #[tokio::test]
    async fn setup_tracks_forwarders_and_teardown_stops_them() {
        let config = resolved_from_json(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "search": { "technology": "searchd" } } } } }"#,
            r#"{ "provider": "local", "namespace": "fwd-test", "components": { "main": {
                "skipProvisioning": true,
                "middlewareDependencies": { "search": { "deploymentType": "container",
                    "use": "searchd", "config": { "port": 47613 } } } } } }"#,
        );
        let dir = TempDir::new().unwrap();
        let paths = RunPaths::new(dir.path(), "dev");
        let registry = StrategyRegistry::new();
        let cluster = SleepCluster;
        let manager = PortForwardManager::new(&cluster, &registry, &paths).with_options(options());

        let mapping = manager.setup(&config).await.unwrap();
        assert_eq!(mapping.forwards.len(), 1);
        let forward = &mapping.forwards[0];
        assert_eq!(forward.service, "main-search");
        assert!(forward.local_port >= 47613);

        let tracking = TrackingFile::load(&paths.port_forward("fwd-test"))
            .unwrap()
            .unwrap();
        assert_eq!(tracking.processes.len(), 1);
        assert!(tracking.processes[0].is_alive());

        assert_eq!(manager.teardown("fwd-test").unwrap(), 1);
        assert!(!paths.port_forward("fwd-test").exists());
        assert_eq!(manager.teardown("fwd-test").unwrap(), 0);
    }

    #[tokio::test]
    async fn occupied_port_aborts_before_spawning() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = resolved_from_json(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "search": { "technology": "searchd" } } } } }"#,
            &format!(
                r#"{{ "provider": "local", "namespace": "fwd-busy", "components": {{ "main": {{
                    "skipProvisioning": true,
                    "middlewareDependencies": {{ "search": {{ "deploymentType": "container",
                        "use": "searchd", "config": {{ "port": {} }} }} }} }} }} }}"#,
                port
            ),
        );
        let dir = TempDir::new().unwrap();
        let paths = RunPaths::new(dir.path(), "dev");
        let registry = StrategyRegistry::new();
        let cluster = SleepCluster;
        let manager = PortForwardManager::new(&cluster, &registry, &paths).with_options(options());

        let err = manager.setup(&config).await.unwrap_err();
        match err {
            Error::PortsOccupied(conflicts) => assert_eq!(conflicts[0].port, port),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!paths.port_forward("fwd-busy").exists());
    }
}
