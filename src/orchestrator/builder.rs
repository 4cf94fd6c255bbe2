use super::Orchestrator;
use crate::config::ManifestSet;
use crate::error::{Error, Result};
use crate::external::{ClusterControl, KubectlClient, ProvisioningEngine, TerraformClient};
use crate::port::ForwardOptions;
use crate::provisioning::StrategyRegistry;
use crate::state::RunPaths;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing an [`Orchestrator`] with a fluent API.
///
/// Only the manifests are required. Without an explicit engine or cluster the
/// orchestrator shells out to `terraform` and to `kubectl` (using the
/// deployment manifest's `kubeContext`).
///
/// # Example
///
/// ```no_run
/// use stackup::{ManifestLoader, Orchestrator};
///
/// # fn example() -> Result<(), stackup::Error> {
/// let manifests = ManifestLoader::new(".").load("staging", None, None)?;
/// let orchestrator = Orchestrator::builder()
///     .manifests(manifests)
///     .work_dir(".")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    manifests: Option<ManifestSet>,
    work_dir: Option<PathBuf>,
    engine: Option<Arc<dyn ProvisioningEngine>>,
    cluster: Option<Arc<dyn ClusterControl>>,
    forward_options: ForwardOptions,
    readiness_attempts: u32,
    readiness_interval: Duration,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            manifests: None,
            work_dir: None,
            engine: None,
            cluster: None,
            forward_options: ForwardOptions::default(),
            readiness_attempts: 30,
            readiness_interval: Duration::from_secs(10),
        }
    }

    /// Set the loaded manifests. Required.
    pub fn manifests(mut self, manifests: ManifestSet) -> Self {
        self.manifests = Some(manifests);
        self
    }

    /// Directory that holds `.stackup/`. Defaults to ".".
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ProvisioningEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterControl>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn forward_options(mut self, options: ForwardOptions) -> Self {
        self.forward_options = options;
        self
    }

    /// How long to poll the engine's outputs for managed endpoints after the
    /// targeted cloud apply.
    pub fn cloud_readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.readiness_attempts = attempts.max(1);
        self.readiness_interval = interval;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let manifests = self
            .manifests
            .ok_or_else(|| Error::Config("manifests are required to build an orchestrator".to_string()))?;
        let work_dir = self.work_dir.unwrap_or_else(|| PathBuf::from("."));
        let paths = RunPaths::new(&work_dir, &manifests.environment);

        let cluster = self.cluster.unwrap_or_else(|| {
            Arc::new(KubectlClient::new(manifests.deploy.kube_context.clone()))
        });
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(TerraformClient::new()));

        Ok(Orchestrator {
            manifests,
            registry: StrategyRegistry::new(),
            paths,
            engine,
            cluster,
            forward_options: self.forward_options,
            readiness_attempts: self.readiness_attempts,
            readiness_interval: self.readiness_interval,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApplicationManifest, DeploymentManifest};

    #[test]
    fn build_requires_manifests() {
        let err = OrchestratorBuilder::new().build().err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn run_directory_follows_environment() {
        let manifests = ManifestSet {
            environment: "staging".to_string(),
            app: ApplicationManifest::default(),
            deploy: serde_json::from_str::<DeploymentManifest>(r#"{ "provider": "local" }"#)
                .unwrap(),
            app_path: PathBuf::from("stackup.app.json"),
            deploy_path: PathBuf::from("deploy.staging.json"),
        };
        let orchestrator = Orchestrator::builder()
            .manifests(manifests)
            .work_dir("/tmp/project")
            .build()
            .unwrap();
        assert_eq!(
            orchestrator.paths().root(),
            std::path::Path::new("/tmp/project/.stackup/staging")
        );
    }
}
