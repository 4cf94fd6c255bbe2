//! Terraform JSON artifacts for a resolved configuration.
//!
//! The generator turns a [`ResolvedConfiguration`](crate::config::ResolvedConfiguration)
//! into an [`ArtifactSet`]: a root module with one module block per
//! namespace, cloud resource, deployment and service, plus the root outputs
//! the orchestrator reads back after apply ([`Discovery`]).

mod generator;
pub mod naming;
mod templates;

pub use generator::{ArtifactGenerator, Exposure};

use crate::config::{EndpointKey, Provider};
use crate::provisioning::ManagedResourceKind;
use crate::Result;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Root module file name inside the artifact directory.
pub const ROOT_FILE: &str = "main.tf.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    Namespace,
    Deployment,
    Service,
    Cloud(ManagedResourceKind),
}

impl ModuleKind {
    pub fn dir(self) -> &'static str {
        match self {
            ModuleKind::Namespace => "namespace",
            ModuleKind::Deployment => "deployment",
            ModuleKind::Service => "service",
            ModuleKind::Cloud(kind) => kind.module_dir(),
        }
    }

    pub fn source(self) -> String {
        format!("./modules/{}", self.dir())
    }

    pub fn is_cloud(self) -> bool {
        matches!(self, ModuleKind::Cloud(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDefinition {
    pub name: String,
    pub kind: ModuleKind,
    pub inputs: Map<String, Value>,
    /// Names of modules that must be applied first.
    pub depends_on: BTreeSet<String>,
}

impl ModuleDefinition {
    pub fn new(name: impl Into<String>, kind: ModuleKind, inputs: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn address(&self) -> String {
        naming::module_address(&self.name)
    }

    fn block(&self) -> Value {
        let mut block = Map::new();
        block.insert("source".to_string(), Value::String(self.kind.source()));
        for (key, value) in &self.inputs {
            block.insert(key.clone(), value.clone());
        }
        if !self.depends_on.is_empty() {
            let deps: Vec<Value> = self
                .depends_on
                .iter()
                .map(|m| Value::String(naming::module_address(m)))
                .collect();
            block.insert("depends_on".to_string(), Value::Array(deps));
        }
        Value::Object(block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDefinition {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// Load balancer address of a public endpoint; fills `publicUrl`.
    PublicAddress,
    /// Address of a cloud-managed resource; fills `value`.
    ManagedEndpoint,
}

/// A root output whose applied value is written back into the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub output: String,
    pub endpoint: EndpointKey,
    pub kind: DiscoveryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    pub provider: Provider,
    pub region: Option<String>,
    pub kube_context: Option<String>,
    pub modules: Vec<ModuleDefinition>,
    pub outputs: Vec<OutputDefinition>,
    pub discoveries: Vec<Discovery>,
}

impl ArtifactSet {
    pub fn module(&self, name: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// `-target` addresses of the cloud resource modules.
    pub fn cloud_targets(&self) -> Vec<String> {
        self.modules
            .iter()
            .filter(|m| m.kind.is_cloud())
            .map(ModuleDefinition::address)
            .collect()
    }

    pub fn module_kinds(&self) -> BTreeSet<ModuleKind> {
        self.modules.iter().map(|m| m.kind).collect()
    }

    pub fn root_document(&self) -> Value {
        let mut required = Map::new();
        required.insert(
            "kubernetes".to_string(),
            json!({ "source": "hashicorp/kubernetes", "version": ">= 2.23" }),
        );

        let mut kubernetes = Map::new();
        kubernetes.insert("config_path".to_string(), json!("~/.kube/config"));
        if let Some(context) = &self.kube_context {
            kubernetes.insert("config_context".to_string(), json!(context));
        }
        let mut providers = Map::new();
        providers.insert("kubernetes".to_string(), Value::Object(kubernetes));

        match self.provider {
            Provider::Aws => {
                required.insert(
                    "aws".to_string(),
                    json!({ "source": "hashicorp/aws", "version": ">= 5.0" }),
                );
                providers.insert(
                    "aws".to_string(),
                    json!({ "region": self.region.as_deref().unwrap_or("us-east-1") }),
                );
            }
            Provider::Gcp => {
                required.insert(
                    "google".to_string(),
                    json!({ "source": "hashicorp/google", "version": ">= 5.0" }),
                );
                providers.insert(
                    "google".to_string(),
                    json!({ "region": self.region.as_deref().unwrap_or("us-central1") }),
                );
            }
            Provider::Local => {}
        }

        let mut document = Map::new();
        document.insert(
            "terraform".to_string(),
            json!({ "required_providers": required }),
        );
        document.insert("provider".to_string(), Value::Object(providers));

        let modules: Map<String, Value> = self
            .modules
            .iter()
            .map(|m| (m.name.clone(), m.block()))
            .collect();
        document.insert("module".to_string(), Value::Object(modules));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|o| (o.name.clone(), json!({ "value": o.value })))
                .collect();
            document.insert("output".to_string(), Value::Object(outputs));
        }
        Value::Object(document)
    }

    /// Writes the root module and every module source it uses.
    ///
    /// `modules/` is rebuilt from scratch. Terraform's own files
    /// (`.terraform/`, state) are left alone.
    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let modules_dir = dir.join("modules");
        if modules_dir.exists() {
            std::fs::remove_dir_all(&modules_dir)?;
        }
        for kind in self.module_kinds() {
            let module_dir = modules_dir.join(kind.dir());
            std::fs::create_dir_all(&module_dir)?;
            write_json(&module_dir.join(ROOT_FILE), &templates::module_source(kind))?;
        }
        write_json(&dir.join(ROOT_FILE), &self.root_document())?;
        tracing::debug!(
            "Wrote {} modules to {}",
            self.modules.len(),
            dir.display()
        );
        Ok(())
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    crate::state::write_atomic(path, content.as_bytes())
}
