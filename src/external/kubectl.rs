//! `kubectl` client.

use super::runner::{run, run_success, strings};
use super::{ClusterControl, ToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const DELETE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct KubectlClient {
    context: Option<String>,
}

impl KubectlClient {
    pub fn new(context: Option<String>) -> Self {
        Self { context }
    }

    /// Global arguments followed by `args`.
    fn args(&self, namespace: Option<&str>, args: &[&str]) -> Vec<String> {
        let mut full = Vec::new();
        if let Some(context) = &self.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        if let Some(ns) = namespace {
            full.push("-n".to_string());
            full.push(ns.to_string());
        }
        full.extend(strings(args));
        full
    }

    async fn get_json(&self, namespace: &str, args: &[&str]) -> Result<Value, ToolError> {
        let mut query = args.to_vec();
        query.extend(["-o", "json"]);
        let output = run_success("kubectl", &self.args(Some(namespace), &query), None, QUERY_TIMEOUT)
            .await?;
        serde_json::from_slice(&output.stdout)
            .map_err(|e| ToolError::unexpected(format!("kubectl {}", args.join(" ")), e.to_string()))
    }
}

/// Ready when every desired replica is available. Zero desired replicas counts as ready.
pub(crate) fn deployment_ready(deployment: &Value) -> bool {
    let desired = deployment["spec"]["replicas"].as_u64().unwrap_or(1);
    let available = deployment["status"]["availableReplicas"].as_u64().unwrap_or(0);
    available >= desired
}

pub(crate) fn deployment_names(list: &Value) -> Vec<String> {
    list["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["metadata"]["name"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ClusterControl for KubectlClient {
    async fn live_deployments(&self, namespace: &str) -> Result<Vec<String>, ToolError> {
        let list = self.get_json(namespace, &["get", "deployments"]).await?;
        Ok(deployment_names(&list))
    }

    async fn is_workload_ready(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> Result<bool, ToolError> {
        let object = self
            .get_json(namespace, &["get", "deployment", deployment])
            .await?;
        Ok(deployment_ready(&object))
    }

    async fn rollout_restart(&self, namespace: &str, deployment: &str) -> Result<(), ToolError> {
        let target = format!("deployment/{}", deployment);
        run_success(
            "kubectl",
            &self.args(Some(namespace), &["rollout", "restart", &target]),
            None,
            QUERY_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ToolError> {
        let output = run(
            "kubectl",
            &self.args(None, &["delete", "namespace", namespace, "--ignore-not-found"]),
            None,
            DELETE_TIMEOUT,
        )
        .await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("NotFound") {
            return Ok(());
        }
        Err(ToolError::failed("kubectl delete namespace", &output))
    }

    fn port_forward_command(
        &self,
        namespace: &str,
        service: &str,
        local_port: u16,
        remote_port: u16,
    ) -> std::process::Command {
        let target = format!("svc/{}", service);
        let ports = format!("{}:{}", local_port, remote_port);
        let mut command = std::process::Command::new("kubectl");
        command.args(self.args(
            Some(namespace),
            &["port-forward", &target, &ports, "--address", "127.0.0.1"],
        ));
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn readiness_compares_available_to_desired() {
        assert!(deployment_ready(&json!({
            "spec": { "replicas": 2 }, "status": { "availableReplicas": 2 }
        })));
        assert!(!deployment_ready(&json!({
            "spec": { "replicas": 2 }, "status": { "availableReplicas": 1 }
        })));
        assert!(!deployment_ready(&json!({ "spec": { "replicas": 1 }, "status": {} })));
        assert!(deployment_ready(&json!({ "spec": { "replicas": 0 }, "status": {} })));
    }

    #[test]
    fn deployment_names_from_list() {
        let list = json!({ "items": [
            { "metadata": { "name": "main" } },
            { "metadata": { "name": "main-db" } }
        ] });
        assert_eq!(deployment_names(&list), vec!["main", "main-db"]);
        assert!(deployment_names(&json!({ "items": [] })).is_empty());
    }

    #[test]
    fn port_forward_targets_service_on_loopback() {
        let client = KubectlClient::new(Some("kind-dev".to_string()));
        let command = client.port_forward_command("shop", "main-db", 5433, 5432);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--context", "kind-dev", "-n", "shop", "port-forward", "svc/main-db",
                "5433:5432", "--address", "127.0.0.1"
            ]
        );
    }
}
