use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPort {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceQuantities {
    pub cpu: String,
    pub memory: String,
}

impl ResourceQuantities {
    pub fn new(cpu: &str, memory: &str) -> Self {
        Self {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRequirements {
    pub requests: ResourceQuantities,
    pub limits: ResourceQuantities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Runs `script` through `sh -c`.
    pub fn shell(mut self, script: impl Into<String>) -> Self {
        self.command = vec!["sh".to_string(), "-c".to_string()];
        self.args = vec![script.into()];
        self
    }
}

/// A file rendered from configuration and mounted read-only into the main container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFile {
    pub file_name: String,
    pub mount_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDefinition {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub public_access: bool,
    pub description: String,
}

impl EndpointDefinition {
    pub fn new(name: &str, port: u16, protocol: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            protocol: protocol.to_string(),
            public_access: false,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandaloneSpec {
    pub container: ContainerSpec,
    pub endpoints: Vec<EndpointDefinition>,
    pub resources: ResourceRequirements,
    pub init_containers: Vec<ContainerSpec>,
    pub sidecars: Vec<ContainerSpec>,
    pub config_file: Option<ConfigFile>,
}

/// One cooperating service of a distributed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    /// Role name, unique within the group (`frontend`, `history`, ...).
    pub name: String,
    pub replicas: u32,
    pub container: ContainerSpec,
    pub init_containers: Vec<ContainerSpec>,
    pub sidecars: Vec<ContainerSpec>,
    /// Exposed ports. A port named like a resolved endpoint serves that endpoint.
    pub endpoints: Vec<EndpointDefinition>,
    /// Roles in the same group that must be reachable first.
    pub depends_on: Vec<String>,
    pub wait_for_load_balancer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProvisioningSpec {
    Standalone(StandaloneSpec),
    Distributed { services: Vec<ServiceSpec> },
}

impl ProvisioningSpec {
    pub fn is_distributed(&self) -> bool {
        matches!(self, ProvisioningSpec::Distributed { .. })
    }
}

/// Cloud-managed resource types with a module template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedResourceKind {
    AwsDbInstance,
    AwsElasticache,
    GcpSqlInstance,
    GcpRedisInstance,
}

impl ManagedResourceKind {
    /// Directory name of the module source under `modules/`.
    pub fn module_dir(self) -> &'static str {
        match self {
            ManagedResourceKind::AwsDbInstance => "aws_db_instance",
            ManagedResourceKind::AwsElasticache => "aws_elasticache",
            ManagedResourceKind::GcpSqlInstance => "gcp_sql_instance",
            ManagedResourceKind::GcpRedisInstance => "gcp_redis_instance",
        }
    }

    pub fn all() -> [ManagedResourceKind; 4] {
        [
            ManagedResourceKind::AwsDbInstance,
            ManagedResourceKind::AwsElasticache,
            ManagedResourceKind::GcpSqlInstance,
            ManagedResourceKind::GcpRedisInstance,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedResource {
    pub kind: ManagedResourceKind,
    pub inputs: Map<String, Value>,
}
