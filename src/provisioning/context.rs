use crate::artifact::naming;
use crate::config::{
    DistributedSettings, Endpoint, Provider, ResolvedComponent, ResolvedConfiguration,
    ResolvedMiddleware,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Everything a strategy may look at when building specs for one entry.
#[derive(Debug, Clone)]
pub struct EnvContext<'a> {
    pub provider: Provider,
    pub namespace: &'a str,
    pub component: &'a str,
    /// `None` when building specs for the component itself.
    pub middleware: Option<&'a str>,
    pub technology: &'a str,
    pub version: Option<&'a str>,
    pub custom_image: Option<&'a str>,
    pub config: &'a Map<String, Value>,
    pub env: Option<&'a BTreeMap<String, String>>,
    pub endpoints: Option<&'a BTreeMap<String, Endpoint>>,
    pub distributed: Option<&'a DistributedSettings>,
    pub replicas: u32,
}

impl<'a> EnvContext<'a> {
    pub fn new(
        provider: Provider,
        namespace: &'a str,
        component: &'a str,
        technology: &'a str,
        config: &'a Map<String, Value>,
    ) -> Self {
        Self {
            provider,
            namespace,
            component,
            middleware: None,
            technology,
            version: None,
            custom_image: None,
            config,
            env: None,
            endpoints: None,
            distributed: None,
            replicas: 1,
        }
    }

    pub fn with_middleware(mut self, middleware: &'a str) -> Self {
        self.middleware = Some(middleware);
        self
    }

    pub fn with_version(mut self, version: Option<&'a str>) -> Self {
        self.version = version;
        self
    }

    pub fn for_middleware(
        config: &'a ResolvedConfiguration,
        component: &'a str,
        name: &'a str,
        mw: &'a ResolvedMiddleware,
    ) -> Self {
        Self {
            provider: config.provider,
            namespace: &config.namespace,
            component,
            middleware: Some(name),
            technology: &mw.technology,
            version: mw.version.as_deref(),
            custom_image: mw.image.as_deref(),
            config: &mw.config,
            env: Some(&mw.env),
            endpoints: Some(&mw.endpoints),
            distributed: mw.distributed.as_ref(),
            replicas: mw.replicas,
        }
    }

    pub fn for_component(
        config: &'a ResolvedConfiguration,
        name: &'a str,
        component: &'a ResolvedComponent,
    ) -> Self {
        Self {
            provider: config.provider,
            namespace: &config.namespace,
            component: name,
            middleware: None,
            technology: "application",
            version: None,
            custom_image: component.image.as_deref(),
            config: &component.app_config,
            env: Some(&component.env),
            endpoints: Some(&component.endpoints),
            distributed: None,
            replicas: component.replicas,
        }
    }

    /// Kubernetes-safe base name shared by every workload of this entry.
    pub fn service_base_name(&self) -> String {
        match self.middleware {
            Some(mw) => naming::service_name(self.component, mw),
            None => naming::sanitize_dns(self.component),
        }
    }

    /// In-cluster DNS name of a role (or the base service when `role` is `None`).
    pub fn service_host(&self, role: Option<&str>) -> String {
        let base = self.service_base_name();
        let name = match role {
            Some(role) => format!("{}-{}", base, role),
            None => base,
        };
        format!("{}.{}.svc.cluster.local", name, self.namespace)
    }

    /// A config value rendered as a string. Numbers and booleans are stringified.
    pub fn config_str(&self, key: &str) -> Option<String> {
        match self.config.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_public(&self, endpoint: &str) -> bool {
        self.endpoints
            .and_then(|eps| eps.get(endpoint))
            .is_some_and(|ep| ep.public_access)
    }

    /// Port of a resolved endpoint, falling back to the strategy default.
    pub fn port_of(&self, endpoint: &str, default: u16) -> u16 {
        self.endpoints
            .and_then(|eps| eps.get(endpoint))
            .map(|ep| ep.port)
            .unwrap_or(default)
    }

    pub fn version_or(&self, default: &'a str) -> &'a str {
        self.version.unwrap_or(default)
    }

    /// Image reference: the custom image if one is set, else `repository:version`.
    pub fn image_or(&self, repository: &str, default_version: &str) -> String {
        match self.custom_image {
            Some(image) => image.to_string(),
            None => format!("{}:{}", repository, self.version.unwrap_or(default_version)),
        }
    }
}
