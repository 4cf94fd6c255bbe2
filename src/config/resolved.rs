//! The merged, validated, de-referenced configuration tree.
//!
//! A `ResolvedConfiguration` is written to `.stackup/<env>/resolved.json` after
//! every mutating pipeline stage and read back as the "previous" input of the
//! next run, so everything here serialises deterministically.

use super::{DeploymentType, DistributedSettings, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfiguration {
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub provider: Provider,
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default)]
    pub components: BTreeMap<String, ResolvedComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedComponent {
    pub deployment_type: DeploymentType,
    pub replicas: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_provisioning: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// The component's own endpoints (`main` when a port is set).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, Endpoint>,

    #[serde(default)]
    pub middleware_dependencies: BTreeMap<String, ResolvedMiddleware>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_services: BTreeMap<String, ResolvedExternalService>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub app_config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMiddleware {
    pub technology: String,
    pub deployment_type: DeploymentType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub replicas: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub config: Map<String, Value>,

    pub endpoints: BTreeMap<String, Endpoint>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed: Option<DistributedSettings>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl ResolvedMiddleware {
    /// Whether this entry becomes cluster workloads.
    pub fn is_provisioned_container(&self) -> bool {
        self.enabled && self.deployment_type == DeploymentType::Container
    }

    /// Whether this entry becomes a cloud-managed resource. The module stays in
    /// the artifact set once its endpoint is known so later applies keep it.
    pub fn is_managed_resource(&self) -> bool {
        self.enabled && self.deployment_type == DeploymentType::Managed
    }

    /// Managed entry whose endpoint has not been discovered yet.
    pub fn awaits_managed_endpoint(&self) -> bool {
        self.is_managed_resource() && self.endpoints.values().any(|e| e.value.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub public_access: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            protocol: protocol.into(),
            public_access: false,
            value: None,
            public_url: None,
        }
    }

    /// URL scheme used when turning a discovered address into a public URL.
    pub fn url_scheme(&self) -> &str {
        match self.protocol.as_str() {
            "http" | "websocket" => "http",
            "https" => "https",
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedExternalService {
    pub provider: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Location of one endpoint in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    pub component: String,
    /// `None` for the component's own endpoints.
    pub middleware: Option<String>,
    pub endpoint: String,
}

impl EndpointKey {
    pub fn middleware(component: &str, middleware: &str, endpoint: &str) -> Self {
        Self {
            component: component.to_string(),
            middleware: Some(middleware.to_string()),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn component(component: &str, endpoint: &str) -> Self {
        Self {
            component: component.to_string(),
            middleware: None,
            endpoint: endpoint.to_string(),
        }
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.middleware {
            Some(mw) => write!(f, "{}.{}.{}", self.component, mw, self.endpoint),
            None => write!(f, "{}.{}", self.component, self.endpoint),
        }
    }
}

impl ResolvedConfiguration {
    pub fn middleware(&self, component: &str, middleware: &str) -> Option<&ResolvedMiddleware> {
        self.components
            .get(component)?
            .middleware_dependencies
            .get(middleware)
    }

    pub fn middleware_mut(
        &mut self,
        component: &str,
        middleware: &str,
    ) -> Option<&mut ResolvedMiddleware> {
        self.components
            .get_mut(component)?
            .middleware_dependencies
            .get_mut(middleware)
    }

    pub fn endpoint(&self, key: &EndpointKey) -> Option<&Endpoint> {
        let component = self.components.get(&key.component)?;
        match &key.middleware {
            Some(mw) => component
                .middleware_dependencies
                .get(mw)?
                .endpoints
                .get(&key.endpoint),
            None => component.endpoints.get(&key.endpoint),
        }
    }

    pub fn endpoint_mut(&mut self, key: &EndpointKey) -> Option<&mut Endpoint> {
        let component = self.components.get_mut(&key.component)?;
        match &key.middleware {
            Some(mw) => component
                .middleware_dependencies
                .get_mut(mw)?
                .endpoints
                .get_mut(&key.endpoint),
            None => component.endpoints.get_mut(&key.endpoint),
        }
    }

    /// Every `(component, middleware name, middleware)` in deterministic order.
    pub fn iter_middleware(&self) -> impl Iterator<Item = (&str, &str, &ResolvedMiddleware)> {
        self.components.iter().flat_map(|(c, comp)| {
            comp.middleware_dependencies
                .iter()
                .map(move |(m, mw)| (c.as_str(), m.as_str(), mw))
        })
    }

    /// Endpoints that must carry a value before a run may complete but don't.
    ///
    /// Components with `skipProvisioning` and disabled entries are exempt.
    /// Public endpoints on cloud providers also need a `publicUrl`.
    pub fn incomplete_endpoints(&self) -> Vec<EndpointKey> {
        let mut missing = Vec::new();
        for (c, comp) in &self.components {
            if comp.skip_provisioning {
                continue;
            }
            for (name, ep) in &comp.endpoints {
                if ep.value.is_none() {
                    missing.push(EndpointKey {
                        component: c.clone(),
                        middleware: None,
                        endpoint: name.clone(),
                    });
                }
            }
            for (m, mw) in &comp.middleware_dependencies {
                if !mw.enabled {
                    continue;
                }
                for (name, ep) in &mw.endpoints {
                    let needs_public =
                        self.provider.is_cloud() && ep.public_access && ep.public_url.is_none();
                    if ep.value.is_none() || needs_public {
                        missing.push(EndpointKey {
                            component: c.clone(),
                            middleware: Some(m.clone()),
                            endpoint: name.clone(),
                        });
                    }
                }
            }
        }
        missing
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
