//! Deployment manifest types (`deploy.<env>.json`).

use super::EndpointDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Target execution substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Aws,
    Gcp,
}

impl Provider {
    pub fn is_local(self) -> bool {
        matches!(self, Provider::Local)
    }

    pub fn is_cloud(self) -> bool {
        !self.is_local()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a component or middleware dependency runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    /// A process on the developer machine, outside the cluster.
    Local,
    /// A container scheduled on the cluster.
    #[default]
    #[serde(alias = "containerized")]
    Container,
    /// A cloud-managed resource (RDS, Cloud SQL, ...).
    Managed,
}

impl DeploymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentType::Local => "local",
            DeploymentType::Container => "container",
            DeploymentType::Managed => "managed",
        }
    }

    /// Legal deployment types for components on the given provider.
    pub fn legal_for_component(provider: Provider) -> &'static [DeploymentType] {
        match provider {
            Provider::Local => &[DeploymentType::Local, DeploymentType::Container],
            Provider::Aws | Provider::Gcp => &[DeploymentType::Container],
        }
    }

    /// Legal deployment types for middleware dependencies on the given provider.
    pub fn legal_for_middleware(provider: Provider) -> &'static [DeploymentType] {
        match provider {
            Provider::Local => &[DeploymentType::Local, DeploymentType::Container],
            Provider::Aws | Provider::Gcp => &[DeploymentType::Container, DeploymentType::Managed],
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    pub provider: Provider,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// kubectl context to deploy into; defaults to the current context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    /// Cloud region for managed resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default)]
    pub components: BTreeMap<String, DeployComponent>,
}

impl DeploymentManifest {
    /// Namespace to deploy into, defaulting to `<app>-<env>`.
    pub fn namespace_or(&self, app_name: Option<&str>, environment: &str) -> String {
        match &self.namespace {
            Some(ns) => ns.clone(),
            None => format!("{}-{}", app_name.unwrap_or("stackup"), environment),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployComponent {
    #[serde(default)]
    pub deployment_type: DeploymentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_access: Option<bool>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_provisioning: bool,

    /// Reference paths this component consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middleware_dependencies: BTreeMap<String, MiddlewareEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_services: BTreeMap<String, DeployExternalService>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<DeployAppConfig>,
}

/// A middleware entry is either written out inline or points at another entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MiddlewareEntry {
    Reference(StructuredReference),
    Inline(DeployMiddleware),
}

impl MiddlewareEntry {
    pub fn as_inline(&self) -> Option<&DeployMiddleware> {
        match self {
            MiddlewareEntry::Inline(mw) => Some(mw),
            MiddlewareEntry::Reference(_) => None,
        }
    }
}

impl From<DeployMiddleware> for MiddlewareEntry {
    fn from(mw: DeployMiddleware) -> Self {
        MiddlewareEntry::Inline(mw)
    }
}

/// `{ "$ref": "components.a.middlewareDependencies.b", "config": {...}, "dependencies": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReference {
    #[serde(rename = "$ref")]
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMiddleware {
    #[serde(default)]
    pub deployment_type: DeploymentType,

    /// Concrete technology strategy. Required for containers.
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    /// `None` means "not given"; `Some(empty)` means intentionally disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, EndpointDeclaration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed: Option<DistributedSettings>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl DeployMiddleware {
    pub fn config_is_empty_object(&self) -> bool {
        matches!(&self.config, Some(map) if map.is_empty())
    }
}

/// Replica counts per role for distributed mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_replicas: Option<u32>,
}

impl DistributedSettings {
    /// Replica count for a role, 1 when unset.
    pub fn replicas_for(&self, role: &str) -> u32 {
        let configured = match role {
            "frontend" => self.frontend_replicas,
            "history" => self.history_replicas,
            "matching" => self.matching_replicas,
            "worker" => self.worker_replicas,
            _ => None,
        };
        configured.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployExternalService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_and_structured_entries() {
        let json = r#"{
            "provider": "local",
            "components": {
                "main": {
                    "middlewareDependencies": {
                        "mainDb": { "deploymentType": "container", "use": "postgresql", "config": {} },
                        "replica": { "$ref": "components.main.middlewareDependencies.mainDb" }
                    }
                }
            }
        }"#;
        let manifest: DeploymentManifest = serde_json::from_str(json).unwrap();
        let main = &manifest.components["main"];

        let db = main.middleware_dependencies["mainDb"].as_inline().unwrap();
        assert_eq!(db.use_strategy.as_deref(), Some("postgresql"));
        assert!(db.config_is_empty_object());

        match &main.middleware_dependencies["replica"] {
            MiddlewareEntry::Reference(r) => {
                assert_eq!(r.target, "components.main.middlewareDependencies.mainDb")
            }
            other => panic!("expected structured reference, got {:?}", other),
        }
    }

    #[test]
    fn legality_tables() {
        assert!(!DeploymentType::legal_for_middleware(Provider::Local)
            .contains(&DeploymentType::Managed));
        assert!(DeploymentType::legal_for_middleware(Provider::Aws)
            .contains(&DeploymentType::Managed));
        assert!(!DeploymentType::legal_for_component(Provider::Gcp)
            .contains(&DeploymentType::Local));
    }

    #[test]
    fn distributed_replicas_default_to_one() {
        let settings = DistributedSettings {
            history_replicas: Some(2),
            ..Default::default()
        };
        assert_eq!(settings.replicas_for("history"), 2);
        assert_eq!(settings.replicas_for("frontend"), 1);
        assert_eq!(settings.replicas_for("admintools"), 1);
    }

    #[test]
    fn namespace_defaults_to_app_and_env() {
        let manifest = DeploymentManifest {
            provider: Provider::Local,
            namespace: None,
            kube_context: None,
            region: None,
            components: BTreeMap::new(),
        };
        assert_eq!(manifest.namespace_or(Some("shop"), "dev"), "shop-dev");
    }
}
