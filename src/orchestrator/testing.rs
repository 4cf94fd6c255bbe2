//! In-memory engine and cluster used by the pipeline tests.

use crate::config::{ApplicationManifest, DeploymentManifest, ManifestSet};
use crate::external::{ClusterControl, ProvisioningEngine, ToolError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub(crate) fn manifests(environment: &str, app: &str, deploy: &str) -> ManifestSet {
    let app: ApplicationManifest = serde_json::from_str(app).unwrap();
    let deploy: DeploymentManifest = serde_json::from_str(deploy).unwrap();
    ManifestSet {
        environment: environment.to_string(),
        app,
        deploy,
        app_path: PathBuf::from("stackup.app.json"),
        deploy_path: PathBuf::from(format!("deploy.{}.json", environment)),
    }
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    outputs: BTreeMap<String, Value>,
    outputs_error: Option<String>,
    validations: Mutex<usize>,
    applies: Mutex<Vec<Vec<String>>>,
    destroys: Mutex<usize>,
}

impl FakeEngine {
    pub(crate) fn with_outputs(outputs: Value) -> Self {
        let outputs = match outputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        Self {
            outputs,
            ..Default::default()
        }
    }

    /// An engine whose `outputs` call always fails with `reason`.
    pub(crate) fn failing_outputs(reason: &str) -> Self {
        Self {
            outputs_error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn validations(&self) -> usize {
        *self.validations.lock()
    }

    pub(crate) fn full_applies(&self) -> usize {
        self.applies.lock().iter().filter(|t| t.is_empty()).count()
    }

    pub(crate) fn targeted_applies(&self) -> Vec<Vec<String>> {
        self.applies
            .lock()
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect()
    }

    pub(crate) fn destroys(&self) -> usize {
        *self.destroys.lock()
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    async fn init(&self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn validate(&self, _dir: &Path) -> Result<(), ToolError> {
        *self.validations.lock() += 1;
        Ok(())
    }

    async fn plan(&self, dir: &Path) -> Result<String, ToolError> {
        Ok(format!("Plan for {}: 0 to change", dir.display()))
    }

    async fn apply(&self, _dir: &Path, targets: &[String]) -> Result<(), ToolError> {
        self.applies.lock().push(targets.to_vec());
        Ok(())
    }

    async fn destroy(&self, _dir: &Path) -> Result<(), ToolError> {
        *self.destroys.lock() += 1;
        Ok(())
    }

    async fn outputs(&self, _dir: &Path) -> Result<BTreeMap<String, Value>, ToolError> {
        if let Some(reason) = &self.outputs_error {
            return Err(ToolError::unexpected("terraform output -json", reason.clone()));
        }
        Ok(self.outputs.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    live: Mutex<Vec<String>>,
    restarted: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub(crate) fn with_live(deployments: &[&str]) -> Self {
        Self {
            live: Mutex::new(deployments.iter().map(|d| d.to_string()).collect()),
            ..Default::default()
        }
    }

    pub(crate) fn restarted(&self) -> Vec<String> {
        self.restarted.lock().clone()
    }

    pub(crate) fn deleted_namespaces(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ClusterControl for FakeCluster {
    async fn live_deployments(&self, _namespace: &str) -> Result<Vec<String>, ToolError> {
        Ok(self.live.lock().clone())
    }

    async fn is_workload_ready(&self, _namespace: &str, _deployment: &str) -> Result<bool, ToolError> {
        Ok(true)
    }

    async fn rollout_restart(&self, _namespace: &str, deployment: &str) -> Result<(), ToolError> {
        self.restarted.lock().push(deployment.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ToolError> {
        self.deleted.lock().push(namespace.to_string());
        self.live.lock().clear();
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
