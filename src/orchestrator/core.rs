use super::builder::OrchestratorBuilder;
use super::stage::{DeployOptions, DeployReport, Stage};
use super::sync;
use crate::artifact::{ArtifactGenerator, ArtifactSet, DiscoveryKind, ROOT_FILE};
use crate::config::{
    IssueCode, ManifestSet, Merger, ResolvedConfiguration, ValidationErrors, ValidationIssue,
};
use crate::error::{Error, Result};
use crate::external::{ClusterControl, ProvisioningEngine, ToolError};
use crate::port::{ForwardOptions, PortForwardManager};
use crate::provisioning::StrategyRegistry;
use crate::reference::{blank_unresolved, RefMap, ReferenceResolver};
use crate::state::{self, build_host_view, detect_lan_address, RunLock, RunPaths};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives a deployment of one environment through its stages.
///
/// Every run takes the `.stackup/<env>/.lock` advisory lock, so concurrent
/// runs against the same environment fail fast instead of interleaving.
pub struct Orchestrator {
    pub(super) manifests: ManifestSet,
    pub(super) registry: StrategyRegistry,
    pub(super) paths: RunPaths,
    pub(super) engine: Arc<dyn ProvisioningEngine>,
    pub(super) cluster: Arc<dyn ClusterControl>,
    pub(super) forward_options: ForwardOptions,
    pub(super) readiness_attempts: u32,
    pub(super) readiness_interval: Duration,
}

/// Maps an external tool failure onto the stage it interrupted.
pub(super) fn stage_error(stage: Stage) -> impl FnOnce(ToolError) -> Error {
    move |e| Error::provisioning(stage, e)
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn manifests(&self) -> &ManifestSet {
        &self.manifests
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn environment(&self) -> &str {
        &self.manifests.environment
    }

    /// Namespace the manifests deploy into.
    pub fn namespace(&self) -> String {
        self.manifests
            .deploy
            .namespace_or(self.manifests.app.name.as_deref(), &self.manifests.environment)
    }

    pub(super) fn lock(&self) -> Result<RunLock> {
        self.paths.ensure()?;
        RunLock::acquire(&self.paths.lock())
    }

    pub(super) fn forwarder(&self) -> PortForwardManager<'_> {
        PortForwardManager::new(self.cluster.as_ref(), &self.registry, &self.paths)
            .with_options(self.forward_options.clone())
    }

    /// Resolved configuration persisted by the last run. An unreadable file is
    /// reported and ignored.
    pub(super) fn load_previous(&self) -> Option<ResolvedConfiguration> {
        match state::load_json(&self.paths.resolved()) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Ignoring previous resolved configuration: {}", e);
                None
            }
        }
    }

    pub(super) fn merge(
        &self,
        previous: Option<&ResolvedConfiguration>,
    ) -> Result<ResolvedConfiguration> {
        Merger::new(&self.registry, self.manifests.environment.clone())
            .with_previous(previous)
            .merge(&self.manifests.app, &self.manifests.deploy)
    }

    pub(super) fn persist(&self, config: &ResolvedConfiguration) -> Result<()> {
        state::save_json(&self.paths.resolved(), config)
    }

    /// Artifacts for a strictly resolved configuration. Tokens still waiting
    /// for a discovered value are rendered empty until the next apply.
    pub(super) fn generate(&self, config: &ResolvedConfiguration) -> Result<ArtifactSet> {
        let (refs, issues) = RefMap::build(config, true);
        if !issues.is_empty() {
            return Err(Error::Validation(ValidationErrors::from(issues)));
        }
        let mut rendered = config.clone();
        let pending = blank_unresolved(&mut rendered);
        if pending > 0 {
            debug!("{} value(s) wait for discovery", pending);
        }
        ArtifactGenerator::new(&self.registry).generate(&rendered, &refs)
    }

    /// Merge and validate the manifests without touching any state.
    pub fn validate(&self) -> Result<ResolvedConfiguration> {
        self.merge(None)
    }

    /// Full deployment of the environment.
    pub async fn deploy(&self, options: DeployOptions) -> Result<DeployReport> {
        let _lock = self.lock()?;
        let mut report = DeployReport::default();

        // The persisted state of a live deployment stays untouched on abort.
        if !options.plan_only {
            self.preflight(&self.namespace(), options.force).await?;
        }

        let previous = self.load_previous();
        let mut config = self.merge(previous.as_ref())?;
        self.persist(&config)?;
        report.complete(Stage::LoadAndValidate);
        info!(
            "Deploying {} to namespace {} ({})",
            config.environment, config.namespace, config.provider
        );

        let cloud_outputs = if config.provider.is_cloud() && !options.plan_only {
            self.provision_cloud_dependencies(&config).await?
        } else {
            None
        };
        report.complete(Stage::ProvisionCloudDependencies);

        if let Some(artifacts) = &cloud_outputs {
            self.await_cloud_dependencies(&mut config, artifacts).await?;
            self.persist(&config)?;
        }
        report.complete(Stage::ValidateCloudDependencyReadiness);

        sync::fill_container_endpoints(&mut config, &self.registry)?;
        ReferenceResolver::strict().resolve(&mut config)?;
        self.persist(&config)?;
        report.complete(Stage::FillContainerEndpoints);

        let dir = self.paths.artifacts();
        let artifacts = self.generate(&config)?;
        artifacts.write(&dir)?;
        report.complete(Stage::GenerateArtifacts);

        if options.plan_only {
            self.engine
                .init(&dir)
                .await
                .map_err(stage_error(Stage::GenerateArtifacts))?;
            self.engine
                .validate(&dir)
                .await
                .map_err(stage_error(Stage::GenerateArtifacts))?;
            let plan = self
                .engine
                .plan(&dir)
                .await
                .map_err(stage_error(Stage::GenerateArtifacts))?;
            report.plan = Some(plan);
            return Ok(report);
        }

        self.apply(&dir, Stage::Apply).await?;
        report.apply_count += 1;
        report.complete(Stage::Apply);

        let outputs = match self.engine.outputs(&dir).await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Could not read outputs after apply; keeping known values: {}", e);
                Default::default()
            }
        };
        let changed = sync::apply_discoveries(&mut config, &artifacts.discoveries, &outputs, None);
        if changed > 0 {
            // Public URL references wait for the first apply.
            ReferenceResolver::strict().resolve(&mut config)?;
        }
        self.persist(&config)?;
        report.discovered_changes = changed;
        report.complete(Stage::SyncDiscoveredValuesFromApply);

        if changed > 0 {
            info!("{} discovered value(s) changed; applying again", changed);
            self.generate(&config)?.write(&dir)?;
            report.complete(Stage::RegenerateArtifacts);

            self.apply(&dir, Stage::ReApply).await?;
            report.apply_count += 1;
            report.complete(Stage::ReApply);
        }

        let mapping = if config.provider.is_local() {
            let forwarder = self.forwarder();
            forwarder.teardown(&config.namespace)?;
            let mapping = forwarder.setup(&config).await?;
            report.complete(Stage::SetupLocalPortForwarding);
            Some(mapping)
        } else {
            None
        };

        let view = match &mapping {
            Some(mapping) => build_host_view(&config, mapping, detect_lan_address()),
            None => config.clone(),
        };
        state::save_json(&self.paths.host_view(), &view)?;
        report.complete(Stage::PersistHostView);

        let incomplete = config.incomplete_endpoints();
        if !incomplete.is_empty() {
            let issues: Vec<ValidationIssue> = incomplete
                .iter()
                .map(|key| {
                    let subject = key.to_string();
                    ValidationIssue::new(
                        &key.component,
                        Some(subject.as_str()),
                        IssueCode::MissingEndpointValue,
                        "endpoint has no value after apply",
                    )
                })
                .collect();
            return Err(Error::Validation(ValidationErrors::from(issues)));
        }

        report.port_mapping = mapping;
        info!(
            "Deploy of {} finished after {} apply cycle(s)",
            config.namespace, report.apply_count
        );
        Ok(report)
    }

    async fn apply(&self, dir: &Path, stage: Stage) -> Result<()> {
        self.engine.init(dir).await.map_err(stage_error(stage))?;
        self.engine.validate(dir).await.map_err(stage_error(stage))?;
        self.engine.apply(dir, &[]).await.map_err(stage_error(stage))
    }

    /// Aborts when the namespace already runs workloads, unless `force` asks
    /// for the previous deployment to be torn down first.
    async fn preflight(&self, namespace: &str, force: bool) -> Result<()> {
        let live = self
            .cluster
            .live_deployments(namespace)
            .await
            .map_err(|e| Error::provisioning("Preflight", e))?;
        if live.is_empty() {
            return Ok(());
        }
        if !force {
            return Err(Error::DeploymentExists {
                namespace: namespace.to_string(),
                deployments: live,
            });
        }
        warn!("Replacing {} live deployment(s) in {}", live.len(), namespace);
        self.teardown(namespace).await
    }

    /// Stops forwarders, destroys applied artifacts and deletes the namespace.
    pub(super) async fn teardown(&self, namespace: &str) -> Result<()> {
        let stopped = self.forwarder().teardown(namespace)?;
        if stopped > 0 {
            info!("Stopped {} port-forward(s)", stopped);
        }

        let dir = self.paths.artifacts();
        if dir.join(ROOT_FILE).exists() {
            self.engine
                .init(&dir)
                .await
                .map_err(|e| Error::provisioning("Destroy", e))?;
            self.engine
                .destroy(&dir)
                .await
                .map_err(|e| Error::provisioning("Destroy", e))?;
        } else {
            debug!("No artifacts in {}; skipping engine destroy", dir.display());
        }

        self.cluster
            .delete_namespace(namespace)
            .await
            .map_err(|e| Error::provisioning("Destroy", e))
    }

    /// Applies only the cloud resource modules. Returns the artifact set whose
    /// discoveries describe them, or `None` when nothing is managed.
    async fn provision_cloud_dependencies(
        &self,
        config: &ResolvedConfiguration,
    ) -> Result<Option<ArtifactSet>> {
        let mut staged = config.clone();
        ReferenceResolver::lenient().resolve(&mut staged)?;
        blank_unresolved(&mut staged);
        let (refs, _) = RefMap::build(&staged, false);
        let artifacts = ArtifactGenerator::new(&self.registry).generate(&staged, &refs)?;
        let targets = artifacts.cloud_targets();
        if targets.is_empty() {
            debug!("No managed resources to provision");
            return Ok(None);
        }

        let stage = Stage::ProvisionCloudDependencies;
        let dir = self.paths.artifacts();
        artifacts.write(&dir)?;
        self.engine.init(&dir).await.map_err(stage_error(stage))?;
        self.engine
            .apply(&dir, &targets)
            .await
            .map_err(stage_error(stage))?;
        info!("Provisioned {} managed resource(s)", targets.len());
        Ok(Some(artifacts))
    }

    /// Polls the engine's outputs until every managed endpoint has a value.
    async fn await_cloud_dependencies(
        &self,
        config: &mut ResolvedConfiguration,
        artifacts: &ArtifactSet,
    ) -> Result<()> {
        let stage = Stage::ValidateCloudDependencyReadiness;
        let dir = self.paths.artifacts();
        for attempt in 1..=self.readiness_attempts {
            let outputs = self.engine.outputs(&dir).await.map_err(stage_error(stage))?;
            sync::apply_discoveries(
                config,
                &artifacts.discoveries,
                &outputs,
                Some(DiscoveryKind::ManagedEndpoint),
            );
            if sync::awaiting_managed(config).is_empty() {
                return Ok(());
            }
            if attempt < self.readiness_attempts {
                debug!(
                    "Managed endpoints not ready (attempt {}/{})",
                    attempt, self.readiness_attempts
                );
                tokio::time::sleep(self.readiness_interval).await;
            }
        }

        let missing: Vec<String> = sync::awaiting_managed(config)
            .iter()
            .map(ToString::to_string)
            .collect();
        Err(Error::provisioning(
            stage,
            format!(
                "no endpoint reported for {} after {} attempt(s)",
                missing.join(", "),
                self.readiness_attempts
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{manifests, FakeCluster, FakeEngine};
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const RELAY_APP: &str = r#"{ "name": "shop", "components": { "main": { "middlewareDependencies": {
        "relay": { "technology": "centrifugo", "endpoints": { "main": { "publicAccess": true } } } } } } }"#;

    const RELAY_DEPLOY: &str = r#"{ "provider": "aws", "components": { "main": {
        "image": "shop:1", "port": 3000,
        "env": { "RELAY_URL": "${ref:components.main.middlewareDependencies.relay.endpoints.main.publicUrl}" },
        "middlewareDependencies": { "relay": { "use": "centrifugo" } } } } }"#;

    const CACHE_APP: &str = r#"{ "name": "shop", "components": { "main": { "middlewareDependencies": {
        "cache": { "technology": "redis" } } } } }"#;

    const CACHE_DEPLOY: &str = r#"{ "provider": "aws", "components": { "main": { "image": "shop:1",
        "env": { "CACHE": "${ref:components.main.middlewareDependencies.cache.endpoint}" },
        "middlewareDependencies": { "cache": { "use": "redis" } } } } }"#;

    fn orchestrator(
        dir: &TempDir,
        app: &str,
        deploy: &str,
        engine: Arc<FakeEngine>,
        cluster: Arc<FakeCluster>,
    ) -> Orchestrator {
        Orchestrator::builder()
            .manifests(manifests("dev", app, deploy))
            .work_dir(dir.path())
            .engine(engine)
            .cluster(cluster)
            .cloud_readiness(2, Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn discovered_address_triggers_exactly_one_extra_apply() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_outputs(json!({
            "main_relay_service_public_address": "lb-1.elb.amazonaws.com"
        })));
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(&dir, RELAY_APP, RELAY_DEPLOY, engine.clone(), cluster.clone());

        let report = orch.deploy(DeployOptions::default()).await.unwrap();
        assert_eq!(report.apply_count, 2);
        assert_eq!(report.discovered_changes, 1);
        assert!(report.reached(Stage::ReApply));
        assert!(!report.reached(Stage::SetupLocalPortForwarding));
        assert!(report.reached(Stage::PersistHostView));
        assert_eq!(engine.full_applies(), 2);

        let saved: ResolvedConfiguration =
            state::load_json(&orch.paths().resolved()).unwrap().unwrap();
        assert_eq!(
            saved.components["main"].env["RELAY_URL"],
            "http://lb-1.elb.amazonaws.com:8000"
        );

        // Same address on the next run: nothing changes, one apply.
        let report = orch.deploy(DeployOptions { force: true, ..Default::default() }).await.unwrap();
        assert_eq!(report.apply_count, 1);
        assert_eq!(report.discovered_changes, 0);
        assert!(!report.reached(Stage::RegenerateArtifacts));
    }

    #[tokio::test]
    async fn live_namespace_aborts_without_force() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_outputs(json!({
            "main_relay_service_public_address": "lb-1.elb.amazonaws.com"
        })));
        let cluster = Arc::new(FakeCluster::with_live(&["main"]));
        let orch = orchestrator(&dir, RELAY_APP, RELAY_DEPLOY, engine.clone(), cluster.clone());

        let err = orch.deploy(DeployOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::DeploymentExists { .. }));
        assert_eq!(engine.full_applies(), 0);

        orch.deploy(DeployOptions { force: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(cluster.deleted_namespaces(), vec!["shop-dev".to_string()]);
    }

    #[tokio::test]
    async fn plan_only_stops_after_generation() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let cluster = Arc::new(FakeCluster::with_live(&["main"]));
        let orch = orchestrator(&dir, RELAY_APP, RELAY_DEPLOY, engine.clone(), cluster);

        let report = orch
            .deploy(DeployOptions { plan_only: true, ..Default::default() })
            .await
            .unwrap();
        assert!(report.plan.is_some());
        assert_eq!(report.apply_count, 0);
        assert_eq!(engine.full_applies(), 0);
        assert!(orch.paths().artifacts().join(ROOT_FILE).exists());
        assert_eq!(report.stages_completed.last(), Some(&Stage::GenerateArtifacts));
        assert_eq!(engine.validations(), 1);
    }

    #[tokio::test]
    async fn aborted_deploy_keeps_the_persisted_configuration() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(
            &dir,
            CACHE_APP,
            CACHE_DEPLOY,
            Arc::default(),
            Arc::new(FakeCluster::default()),
        );
        first.deploy(DeployOptions::default()).await.unwrap();
        let before = std::fs::read_to_string(first.paths().resolved()).unwrap();
        assert!(before.contains("main-cache.shop-dev.svc.cluster.local:6379"));

        let second = orchestrator(
            &dir,
            CACHE_APP,
            CACHE_DEPLOY,
            Arc::default(),
            Arc::new(FakeCluster::with_live(&["main"])),
        );
        let err = second.deploy(DeployOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::DeploymentExists { .. }));
        let after = std::fs::read_to_string(second.paths().resolved()).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unreadable_outputs_after_apply_only_warn() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::failing_outputs("state lock held"));
        let orch = orchestrator(
            &dir,
            CACHE_APP,
            CACHE_DEPLOY,
            engine.clone(),
            Arc::new(FakeCluster::default()),
        );

        let report = orch.deploy(DeployOptions::default()).await.unwrap();
        assert_eq!(report.apply_count, 1);
        assert_eq!(report.discovered_changes, 0);
        assert!(report.reached(Stage::SyncDiscoveredValuesFromApply));
        assert!(report.reached(Stage::PersistHostView));
        assert_eq!(engine.full_applies(), 1);
        assert_eq!(engine.validations(), 1);
    }

    #[tokio::test]
    async fn missing_public_address_fails_the_run() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let orch = orchestrator(
            &dir,
            RELAY_APP,
            RELAY_DEPLOY,
            engine.clone(),
            Arc::new(FakeCluster::default()),
        );

        let err = orch.deploy(DeployOptions::default()).await.unwrap_err();
        match err {
            Error::Validation(errors) => {
                let missing = errors.with_code(IssueCode::MissingEndpointValue);
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].subject.as_deref(), Some("main.relay.main"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(engine.full_applies(), 1);
        assert!(orch.paths().resolved().exists());
    }

    #[tokio::test]
    async fn managed_database_is_provisioned_before_the_workloads() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_outputs(json!({
            "main_db_cloud_endpoint": "shop.abc.rds.amazonaws.com:5432"
        })));
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(
            &dir,
            r#"{ "components": { "main": { "middlewareDependencies": {
                "db": { "technology": "postgresql" } } } } }"#,
            r#"{ "provider": "aws", "components": { "main": { "image": "shop:1", "port": 3000,
                "env": { "DATABASE_HOST": "${ref:components.main.middlewareDependencies.db.endpoint}" },
                "middlewareDependencies": { "db": { "deploymentType": "managed",
                    "config": { "database": "shop" } } } } } }"#,
            engine.clone(),
            cluster,
        );

        let report = orch.deploy(DeployOptions::default()).await.unwrap();
        assert_eq!(
            engine.targeted_applies(),
            vec![vec!["module.main_db_cloud".to_string()]]
        );
        // The managed value was known before the full apply.
        assert_eq!(report.apply_count, 1);

        let saved: ResolvedConfiguration =
            state::load_json(&orch.paths().resolved()).unwrap().unwrap();
        assert_eq!(
            saved.components["main"].env["DATABASE_HOST"],
            "shop.abc.rds.amazonaws.com:5432"
        );
    }

    #[tokio::test]
    async fn missing_managed_endpoint_fails_readiness() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let orch = orchestrator(
            &dir,
            r#"{ "components": { "main": { "middlewareDependencies": {
                "cache": { "technology": "redis" } } } } }"#,
            r#"{ "provider": "gcp", "components": { "main": { "image": "shop:1",
                "middlewareDependencies": { "cache": { "deploymentType": "managed", "config": { "memorySizeGb": 1 } } } } } }"#,
            engine,
            Arc::new(FakeCluster::default()),
        );

        let err = orch.deploy(DeployOptions::default()).await.unwrap_err();
        match err {
            Error::Provisioning { stage, message } => {
                assert_eq!(stage, "ValidateCloudDependencyReadiness");
                assert!(message.contains("main.cache.main"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
