//! Pipelines besides `deploy` that share the orchestrator's engine and state.

use super::core::Orchestrator;
use super::sync;
use crate::artifact::naming;
use crate::config::ResolvedConfiguration;
use crate::error::{Error, Result};
use crate::port::PortMapping;
use crate::reference::ReferenceResolver;
use crate::state::{self, build_host_view, detect_lan_address, refresh_public_urls};
use tracing::{info, warn};

impl Orchestrator {
    /// Last persisted resolved configuration, required by the pipelines that
    /// act on an existing deployment.
    fn require_resolved(&self) -> Result<ResolvedConfiguration> {
        state::load_json(&self.paths.resolved())?.ok_or_else(|| {
            Error::Config(format!(
                "no resolved configuration for '{}' in {}; run `stackup deploy` first",
                self.manifests.environment,
                self.paths.root().display()
            ))
        })
    }

    /// Merge, fill known addresses, resolve references and persist. No
    /// external tool is called.
    pub fn generate_config(&self) -> Result<ResolvedConfiguration> {
        let _lock = self.lock()?;
        let previous = self.load_previous();
        let mut config = self.merge(previous.as_ref())?;
        sync::fill_container_endpoints(&mut config, &self.registry)?;
        ReferenceResolver::strict().resolve(&mut config)?;
        self.persist(&config)?;
        info!(
            "Wrote resolved configuration to {}",
            self.paths.resolved().display()
        );
        Ok(config)
    }

    /// Tears the environment down and removes its persisted state.
    pub async fn destroy(&self) -> Result<()> {
        let _lock = self.lock()?;
        let namespace = self
            .load_previous()
            .map(|previous| previous.namespace)
            .unwrap_or_else(|| self.namespace());
        info!("Destroying namespace {}", namespace);

        self.teardown(&namespace).await?;

        for file in [self.paths.resolved(), self.paths.host_view()] {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let artifacts = self.paths.artifacts();
        if artifacts.exists() {
            std::fs::remove_dir_all(&artifacts)?;
        }
        Ok(())
    }

    /// `kubectl rollout restart` for each target, or for every live deployment
    /// when `targets` is empty. Targets may be deployment or component names.
    pub async fn restart(&self, targets: &[String]) -> Result<Vec<String>> {
        let namespace = self
            .load_previous()
            .map(|previous| previous.namespace)
            .unwrap_or_else(|| self.namespace());
        let live = self
            .cluster
            .live_deployments(&namespace)
            .await
            .map_err(|e| Error::provisioning("Restart", e))?;

        let selected: Vec<String> = if targets.is_empty() {
            live.clone()
        } else {
            let mut selected = Vec::with_capacity(targets.len());
            for target in targets {
                let name = naming::sanitize_dns(target);
                if live.iter().any(|d| d == target) {
                    selected.push(target.clone());
                } else if live.iter().any(|d| *d == name) {
                    selected.push(name);
                } else {
                    return Err(Error::ComponentNotFound(format!(
                        "{} (live deployments in {}: {})",
                        target,
                        namespace,
                        if live.is_empty() { "none".to_string() } else { live.join(", ") }
                    )));
                }
            }
            selected
        };

        for deployment in &selected {
            self.cluster
                .rollout_restart(&namespace, deployment)
                .await
                .map_err(|e| Error::provisioning("Restart", e))?;
            info!("Restarted {}", deployment);
        }
        Ok(selected)
    }

    /// Replaces the forwarders of the last deployment and rewrites the host view.
    pub async fn port_forward(&self) -> Result<PortMapping> {
        let _lock = self.lock()?;
        let config = self.require_resolved()?;
        if config.provider.is_cloud() {
            warn!(
                "Forwarding ports of a {} deployment; endpoints stay reachable through the cluster as well",
                config.provider
            );
        }

        let forwarder = self.forwarder();
        forwarder.teardown(&config.namespace)?;
        let mapping = forwarder.setup(&config).await?;

        let view = build_host_view(&config, &mapping, detect_lan_address());
        state::save_json(&self.paths.host_view(), &view)?;
        Ok(mapping)
    }

    /// Recomputes public URLs in the host view for the current LAN address.
    /// Returns how many endpoints changed.
    pub fn update_public_urls(&self) -> Result<usize> {
        let _lock = self.lock()?;
        let path = self.paths.host_view();
        let mut view: ResolvedConfiguration = state::load_json(&path)?.ok_or_else(|| {
            Error::Config(format!(
                "no host view at {}; run `stackup port-forward` first",
                path.display()
            ))
        })?;

        let changed = refresh_public_urls(&mut view, detect_lan_address());
        if changed > 0 {
            state::save_json(&path, &view)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{manifests, FakeCluster, FakeEngine};
    use super::super::DeployOptions;
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    const APP: &str = r#"{ "name": "shop", "components": { "main": { "middlewareDependencies": {
        "cache": { "technology": "redis" } } } } }"#;

    const DEPLOY: &str = r#"{ "provider": "aws", "components": { "main": { "image": "shop:1",
        "env": { "CACHE": "${ref:components.main.middlewareDependencies.cache.endpoint}" },
        "middlewareDependencies": { "cache": { "use": "redis" } } } } }"#;

    fn orchestrator(
        dir: &TempDir,
        engine: Arc<FakeEngine>,
        cluster: Arc<FakeCluster>,
    ) -> Orchestrator {
        Orchestrator::builder()
            .manifests(manifests("dev", APP, DEPLOY))
            .work_dir(dir.path())
            .engine(engine)
            .cluster(cluster)
            .build()
            .unwrap()
    }

    #[test]
    fn generate_config_resolves_cluster_addresses() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, Arc::default(), Arc::default());
        let config = orch.generate_config().unwrap();
        assert_eq!(
            config.components["main"].env["CACHE"],
            "main-cache.shop-dev.svc.cluster.local:6379"
        );
        assert!(orch.paths().resolved().exists());
    }

    #[tokio::test]
    async fn destroy_removes_state_and_namespace() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let cluster = Arc::new(FakeCluster::default());
        let orch = orchestrator(&dir, engine.clone(), cluster.clone());
        orch.deploy(DeployOptions::default()).await.unwrap();
        assert!(orch.paths().host_view().exists());

        orch.destroy().await.unwrap();
        assert_eq!(engine.destroys(), 1);
        assert_eq!(cluster.deleted_namespaces(), vec!["shop-dev".to_string()]);
        assert!(!orch.paths().resolved().exists());
        assert!(!orch.paths().host_view().exists());
        assert!(!orch.paths().artifacts().exists());
    }

    #[tokio::test]
    async fn restart_accepts_component_style_names() {
        let dir = TempDir::new().unwrap();
        let cluster = Arc::new(FakeCluster::with_live(&["main", "main-cache"]));
        let orch = orchestrator(&dir, Arc::default(), cluster.clone());

        let restarted = orch.restart(&["main-cache".to_string()]).await.unwrap();
        assert_eq!(restarted, vec!["main-cache".to_string()]);

        let err = orch.restart(&["billing".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("billing"));

        orch.restart(&[]).await.unwrap();
        assert_eq!(cluster.restarted(), vec!["main-cache", "main", "main-cache"]);
    }

    #[tokio::test]
    async fn port_forward_needs_a_previous_run() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, Arc::default(), Arc::default());
        let err = orch.port_forward().await.unwrap_err();
        assert!(err.to_string().contains("stackup deploy"));
        assert!(orch.update_public_urls().is_err());
    }
}
