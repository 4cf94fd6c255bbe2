//! External tools: the Kubernetes CLI and the provisioning engine.
//!
//! The orchestrator talks to both through the [`ClusterControl`] and
//! [`ProvisioningEngine`] traits so runs can be exercised with in-memory fakes.

mod error;
mod kubectl;
mod runner;
mod terraform;

pub use error::ToolError;
pub use kubectl::KubectlClient;
pub use terraform::TerraformClient;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Applies generated artifacts. Every call works on one artifact directory.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    async fn init(&self, dir: &Path) -> Result<(), ToolError>;

    async fn validate(&self, dir: &Path) -> Result<(), ToolError>;

    /// Human-readable plan.
    async fn plan(&self, dir: &Path) -> Result<String, ToolError>;

    /// Applies everything, or only `targets` (`module.<name>`) when non-empty.
    async fn apply(&self, dir: &Path, targets: &[String]) -> Result<(), ToolError>;

    async fn destroy(&self, dir: &Path) -> Result<(), ToolError>;

    /// Root output values by name.
    async fn outputs(&self, dir: &Path) -> Result<BTreeMap<String, Value>, ToolError>;
}

/// Read and control access to the target cluster.
#[async_trait]
pub trait ClusterControl: Send + Sync {
    /// Names of the deployments currently present in `namespace`.
    async fn live_deployments(&self, namespace: &str) -> Result<Vec<String>, ToolError>;

    /// Whether every desired replica of a deployment is available.
    async fn is_workload_ready(&self, namespace: &str, deployment: &str)
        -> Result<bool, ToolError>;

    async fn rollout_restart(&self, namespace: &str, deployment: &str) -> Result<(), ToolError>;

    /// Deletes the namespace. A missing namespace is not an error.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), ToolError>;

    /// Command that forwards `127.0.0.1:<local>` to `service:<remote>`.
    fn port_forward_command(
        &self,
        namespace: &str,
        service: &str,
        local_port: u16,
        remote_port: u16,
    ) -> std::process::Command;
}
