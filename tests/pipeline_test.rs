//! End-to-end runs of the deploy pipeline against in-process stand-ins for
//! kubectl and terraform.

use async_trait::async_trait;
use serde_json::Value;
use stackup::external::{ClusterControl, ProvisioningEngine, ToolError};
use stackup::port::ForwardOptions;
use stackup::state::load_json;
use stackup::{DeployOptions, Error, ManifestLoader, Orchestrator, ResolvedConfiguration, Stage};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingEngine {
    applies: AtomicUsize,
    destroys: AtomicUsize,
}

#[async_trait]
impl ProvisioningEngine for RecordingEngine {
    async fn init(&self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn validate(&self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn plan(&self, _dir: &Path) -> Result<String, ToolError> {
        Ok("No changes.".to_string())
    }

    async fn apply(&self, dir: &Path, _targets: &[String]) -> Result<(), ToolError> {
        assert!(dir.join("main.tf.json").exists());
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self, _dir: &Path) -> Result<(), ToolError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn outputs(&self, _dir: &Path) -> Result<BTreeMap<String, Value>, ToolError> {
        Ok(BTreeMap::new())
    }
}

struct IdleCluster {
    live: Vec<String>,
}

#[async_trait]
impl ClusterControl for IdleCluster {
    async fn live_deployments(&self, _namespace: &str) -> Result<Vec<String>, ToolError> {
        Ok(self.live.clone())
    }

    async fn is_workload_ready(&self, _namespace: &str, _deployment: &str) -> Result<bool, ToolError> {
        Ok(true)
    }

    async fn rollout_restart(&self, _namespace: &str, _deployment: &str) -> Result<(), ToolError> {
        Ok(())
    }

    async fn delete_namespace(&self, _namespace: &str) -> Result<(), ToolError> {
        Ok(())
    }

    fn port_forward_command(
        &self,
        _namespace: &str,
        _service: &str,
        _local_port: u16,
        _remote_port: u16,
    ) -> std::process::Command {
        let mut command = std::process::Command::new("sleep");
        command.arg("30");
        command
    }
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("stackup.app.json"),
        r#"{
            "name": "shop",
            "components": { "main": {
                "middlewareDependencies": { "cache": { "technology": "redis" } }
            } }
        }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("deploy.dev.json"),
        r#"{
            "provider": "local",
            "components": { "main": {
                "image": "shop:1",
                "port": 3000,
                "middlewareDependencies": { "cache": { "use": "redis" } }
            } }
        }"#,
    )
    .unwrap();
    dir
}

fn orchestrator(dir: &Path, engine: Arc<RecordingEngine>, live: &[&str]) -> Orchestrator {
    let manifests = ManifestLoader::new(dir).load("dev", None, None).unwrap();
    Orchestrator::builder()
        .manifests(manifests)
        .work_dir(dir)
        .engine(engine)
        .cluster(Arc::new(IdleCluster {
            live: live.iter().map(|d| d.to_string()).collect(),
        }))
        .forward_options(ForwardOptions {
            readiness_attempts: 1,
            readiness_interval: Duration::from_millis(10),
            concurrency: 4,
            probe_timeout: Duration::from_millis(10),
            probe_attempts: 1,
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn local_deploy_forwards_ports_and_destroy_cleans_up() {
    let dir = workspace();
    let engine = Arc::new(RecordingEngine::default());
    let orch = orchestrator(dir.path(), engine.clone(), &[]);

    let report = orch.deploy(DeployOptions::default()).await.unwrap();
    assert_eq!(report.apply_count, 1);
    assert_eq!(engine.applies.load(Ordering::SeqCst), 1);
    assert!(report.reached(Stage::SetupLocalPortForwarding));

    let mapping = report.port_mapping.expect("local deploys forward ports");
    assert_eq!(mapping.namespace, "shop-dev");
    assert!(mapping
        .forwards
        .iter()
        .any(|f| f.endpoint.middleware.as_deref() == Some("cache") && f.remote_port == 6379));

    let resolved: ResolvedConfiguration = load_json(&orch.paths().resolved()).unwrap().unwrap();
    assert_eq!(resolved.namespace, "shop-dev");
    assert!(orch.paths().host_view().exists());
    assert!(orch.paths().artifacts().join("main.tf.json").exists());

    orch.destroy().await.unwrap();
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);
    assert!(!orch.paths().resolved().exists());
    assert!(!orch.paths().artifacts().exists());
}

#[tokio::test]
async fn existing_deployment_blocks_a_second_deploy() {
    let dir = workspace();
    let engine = Arc::new(RecordingEngine::default());
    let orch = orchestrator(dir.path(), engine.clone(), &["main"]);

    let err = orch.deploy(DeployOptions::default()).await.unwrap_err();
    match err {
        Error::DeploymentExists { namespace, deployments } => {
            assert_eq!(namespace, "shop-dev");
            assert_eq!(deployments, vec!["main"]);
        }
        other => panic!("expected DeploymentExists, got {other}"),
    }
    assert_eq!(engine.applies.load(Ordering::SeqCst), 0);
}
