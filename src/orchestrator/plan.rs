use super::core::Orchestrator;
use super::sync;
use crate::artifact::{ArtifactGenerator, Exposure, ModuleKind};
use crate::config::{EndpointKey, Provider};
use crate::error::Result;
use crate::reference::{RefMap, ReferenceResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedModule {
    pub name: String,
    pub kind: ModuleKind,
    pub depends_on: Vec<String>,
}

/// What a deploy would create, computed without calling any external tool.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub environment: String,
    pub namespace: String,
    pub provider: Provider,
    pub modules: Vec<PlannedModule>,
    pub outputs: Vec<String>,
    pub exposures: Vec<Exposure>,
    /// Endpoints that only get a value once the deployment is applied.
    pub unresolved: Vec<EndpointKey>,
}

impl Orchestrator {
    /// Read-only preview of the merged configuration and the module graph.
    /// Nothing is persisted.
    pub fn plan(&self) -> Result<PlanSummary> {
        let previous = self.load_previous();
        let mut config = self.merge(previous.as_ref())?;
        sync::fill_container_endpoints(&mut config, &self.registry)?;
        ReferenceResolver::lenient().resolve(&mut config)?;
        let (refs, _) = RefMap::build(&config, false);
        let artifacts = ArtifactGenerator::new(&self.registry).generate(&config, &refs)?;
        let exposures = ArtifactGenerator::new(&self.registry).exposures(&config)?;

        Ok(PlanSummary {
            environment: config.environment.clone(),
            namespace: config.namespace.clone(),
            provider: config.provider,
            modules: artifacts
                .modules
                .iter()
                .map(|m| PlannedModule {
                    name: m.name.clone(),
                    kind: m.kind,
                    depends_on: m.depends_on.iter().cloned().collect(),
                })
                .collect(),
            outputs: artifacts.outputs.iter().map(|o| o.name.clone()).collect(),
            exposures,
            unresolved: config.incomplete_endpoints(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::manifests;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plan_lists_modules_without_persisting() {
        let dir = TempDir::new().unwrap();
        let orch = Orchestrator::builder()
            .manifests(manifests(
                "dev",
                r#"{ "components": { "main": { "middlewareDependencies": {
                    "mainDb": { "technology": "postgresql" } } } } }"#,
                r#"{ "provider": "local", "namespace": "shop", "components": { "main": {
                    "image": "shop:1", "port": 3000,
                    "middlewareDependencies": { "mainDb": { "use": "postgresql" } } } } }"#,
            ))
            .work_dir(dir.path())
            .build()
            .unwrap();

        let plan = orch.plan().unwrap();
        assert_eq!(plan.namespace, "shop");
        let names: Vec<&str> = plan.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names[0], "namespace");
        assert!(names.contains(&"main_main_db_deployment"));
        assert!(names.contains(&"main_main_db_service"));
        assert!(names.contains(&"main_deployment"));
        let db = plan
            .exposures
            .iter()
            .find(|e| e.endpoint.middleware.as_deref() == Some("mainDb"))
            .unwrap();
        assert_eq!(db.target_port, 5432);
        assert!(plan.unresolved.is_empty());
        assert!(!orch.paths().resolved().exists());
    }
}
