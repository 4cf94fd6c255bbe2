//! Merges an application manifest and a deployment manifest into a
//! [`ResolvedConfiguration`].
//!
//! Precedence, lowest first: strategy defaults, application manifest,
//! deployment manifest. Endpoint values discovered by a previous run are carried
//! over so that a re-run does not forget load balancer addresses or managed
//! resource endpoints.

use super::validation::{validate_manifests, ValidationErrors};
use super::{
    AppComponent, AppMiddleware, ApplicationManifest, DeployComponent, DeployMiddleware,
    DeploymentManifest, DeploymentType, Endpoint, EndpointDeclaration, ResolvedComponent,
    ResolvedConfiguration, ResolvedExternalService, ResolvedMiddleware,
};
use crate::error::{Error, Result};
use crate::provisioning::{EndpointDefinition, EnvContext, StrategyRegistry};
use crate::reference;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Recursively merges `overrides` into `target`. Nested objects merge key by
/// key; any other value in `overrides` replaces the one in `target`.
pub fn deep_merge(target: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

pub struct Merger<'a> {
    registry: &'a StrategyRegistry,
    environment: String,
    previous: Option<&'a ResolvedConfiguration>,
}

impl<'a> Merger<'a> {
    pub fn new(registry: &'a StrategyRegistry, environment: impl Into<String>) -> Self {
        Self {
            registry,
            environment: environment.into(),
            previous: None,
        }
    }

    /// Reuse endpoint values from the configuration persisted by an earlier run.
    pub fn with_previous(mut self, previous: Option<&'a ResolvedConfiguration>) -> Self {
        self.previous = previous;
        self
    }

    pub fn merge(
        &self,
        app: &ApplicationManifest,
        deploy: &DeploymentManifest,
    ) -> Result<ResolvedConfiguration> {
        let (expanded, mut issues) = reference::expand_structured_references(deploy);
        issues.extend(validate_manifests(app, &expanded, self.registry));
        if !issues.is_empty() {
            return Err(Error::Validation(ValidationErrors::from(issues)));
        }

        let namespace = expanded.namespace_or(app.name.as_deref(), &self.environment);
        let previous = self.previous.filter(|prev| {
            let matches = prev.environment == self.environment
                && prev.namespace == namespace
                && prev.provider == expanded.provider;
            if !matches {
                tracing::warn!(
                    "Ignoring previous resolved configuration for {}/{} ({}): it does not match {}/{} ({})",
                    prev.environment,
                    prev.namespace,
                    prev.provider,
                    self.environment,
                    namespace,
                    expanded.provider
                );
            }
            matches
        });

        let mut components = BTreeMap::new();
        for (name, deploy_component) in &expanded.components {
            let component = self.merge_component(
                name,
                app.components.get(name),
                deploy_component,
                &expanded,
                &namespace,
                previous.and_then(|p| p.components.get(name)),
            );
            components.insert(name.clone(), component);
        }

        let resolved = ResolvedConfiguration {
            generated_at: Utc::now(),
            environment: self.environment.clone(),
            provider: expanded.provider,
            namespace,
            kube_context: expanded.kube_context.clone(),
            region: expanded.region.clone(),
            components,
        };

        let reference_issues = reference::check_references(&resolved);
        if !reference_issues.is_empty() {
            return Err(Error::Validation(ValidationErrors::from(reference_issues)));
        }

        tracing::debug!(
            "Merged {} component(s) into namespace {}",
            resolved.components.len(),
            resolved.namespace
        );
        Ok(resolved)
    }

    fn merge_component(
        &self,
        name: &str,
        app_component: Option<&AppComponent>,
        deploy_component: &DeployComponent,
        deploy: &DeploymentManifest,
        namespace: &str,
        previous: Option<&ResolvedComponent>,
    ) -> ResolvedComponent {
        let mut middleware_dependencies = BTreeMap::new();
        for (mw_name, entry) in &deploy_component.middleware_dependencies {
            let Some(mw) = entry.as_inline() else {
                continue;
            };
            let app_mw = app_component.and_then(|c| c.middleware_dependencies.get(mw_name));
            let resolved = self.merge_middleware(
                name,
                mw_name,
                app_mw,
                mw,
                deploy,
                namespace,
                previous.and_then(|p| p.middleware_dependencies.get(mw_name)),
            );
            middleware_dependencies.insert(mw_name.clone(), resolved);
        }

        let mut external_services = BTreeMap::new();
        for (svc_name, entry) in &deploy_component.external_services {
            let app_svc = app_component.and_then(|c| c.external_services.get(svc_name));
            let mut config = app_svc.map(|s| s.config.clone()).unwrap_or_default();
            if let Some(overrides) = &entry.config {
                deep_merge(&mut config, overrides);
            }
            let disabled = matches!(&entry.config, Some(map) if map.is_empty())
                && app_svc.is_some_and(|s| !s.required.is_empty());
            external_services.insert(
                svc_name.clone(),
                ResolvedExternalService {
                    provider: app_svc
                        .map(|s| s.provider.clone())
                        .unwrap_or_else(|| "custom".to_string()),
                    enabled: !disabled,
                    config,
                },
            );
        }

        let mut app_config = app_component
            .and_then(|c| c.app_config.as_ref())
            .map(|c| c.config.clone())
            .unwrap_or_default();
        if let Some(overrides) = deploy_component.app_config.as_ref().and_then(|c| c.config.as_ref()) {
            deep_merge(&mut app_config, overrides);
        }

        let mut endpoints = BTreeMap::new();
        if let Some(port) = deploy_component.port {
            let mut main = Endpoint::new("main", port, "http");
            main.public_access = deploy_component.public_access.unwrap_or(false);
            endpoints.insert("main".to_string(), main);
        }
        carry_over_values(&mut endpoints, previous.map(|p| &p.endpoints));

        ResolvedComponent {
            deployment_type: deploy_component.deployment_type,
            replicas: deploy_component.replicas.unwrap_or(1),
            host: deploy_component.host.clone(),
            image: deploy_component.image.clone(),
            skip_provisioning: deploy_component.skip_provisioning,
            dependencies: deploy_component.dependencies.clone(),
            env: deploy_component.env.clone(),
            endpoints,
            middleware_dependencies,
            external_services,
            app_config,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_middleware(
        &self,
        component: &str,
        name: &str,
        app_mw: Option<&AppMiddleware>,
        mw: &DeployMiddleware,
        deploy: &DeploymentManifest,
        namespace: &str,
        previous: Option<&ResolvedMiddleware>,
    ) -> ResolvedMiddleware {
        let declared = app_mw.map(|m| m.technology.as_str());
        let requested = match mw.deployment_type {
            DeploymentType::Container => mw.use_strategy.as_deref().or(declared),
            DeploymentType::Local | DeploymentType::Managed => {
                declared.or(mw.use_strategy.as_deref())
            }
        };
        let technology = self.registry.canonical_id(requested.unwrap_or("generic"));
        let strategy = self.registry.create_or_generic(&technology);

        let mut config = app_mw.map(|m| m.config.clone()).unwrap_or_default();
        if let Some(overrides) = &mw.config {
            deep_merge(&mut config, overrides);
        }

        let enabled = !(mw.config_is_empty_object() && app_mw.is_some_and(|m| !m.required.is_empty()));
        if !enabled {
            tracing::info!("{}.{} is disabled for this environment", component, name);
        }

        let ctx = EnvContext::new(deploy.provider, namespace, component, &technology, &config)
            .with_middleware(name)
            .with_version(mw.version.as_deref());
        let mut endpoints = merge_endpoints(
            strategy.endpoint_definitions(&ctx),
            app_mw.map(|m| &m.endpoints),
            &mw.endpoints,
        );
        carry_over_values(&mut endpoints, previous.map(|p| &p.endpoints));

        ResolvedMiddleware {
            technology,
            deployment_type: mw.deployment_type,
            enabled,
            replicas: mw.replicas.unwrap_or(1),
            version: mw.version.clone(),
            image: mw.image.clone(),
            config,
            endpoints,
            env: mw.env.clone(),
            distributed: mw.distributed.clone(),
            dependencies: mw.dependencies.clone(),
        }
    }
}

fn merge_endpoints(
    defaults: Vec<EndpointDefinition>,
    app: Option<&BTreeMap<String, EndpointDeclaration>>,
    deploy: &BTreeMap<String, EndpointDeclaration>,
) -> BTreeMap<String, Endpoint> {
    let mut endpoints: BTreeMap<String, Endpoint> = defaults
        .into_iter()
        .map(|def| {
            let mut ep = Endpoint::new(def.name.clone(), def.port, def.protocol);
            ep.public_access = def.public_access;
            (def.name, ep)
        })
        .collect();
    let fallback_port = endpoints.get("main").map(|e| e.port).unwrap_or(8080);

    for layer in app.into_iter().chain(std::iter::once(deploy)) {
        for (name, decl) in layer {
            let ep = endpoints.entry(name.clone()).or_insert_with(|| {
                Endpoint::new(name.clone(), decl.port.unwrap_or(fallback_port), "tcp")
            });
            if let Some(port) = decl.port {
                ep.port = port;
            }
            if let Some(protocol) = &decl.protocol {
                ep.protocol = protocol.clone();
            }
            if let Some(public) = decl.public_access {
                ep.public_access = public;
            }
        }
    }
    endpoints
}

/// Keeps discovered values from the previous run, unless the endpoint's port or
/// protocol has since changed.
fn carry_over_values(
    endpoints: &mut BTreeMap<String, Endpoint>,
    previous: Option<&BTreeMap<String, Endpoint>>,
) {
    let Some(previous) = previous else {
        return;
    };
    for (name, ep) in endpoints.iter_mut() {
        let Some(prev) = previous.get(name) else {
            continue;
        };
        if prev.port != ep.port || prev.protocol != ep.protocol {
            tracing::debug!("Endpoint {} changed shape; dropping previous values", name);
            continue;
        }
        if ep.value.is_none() {
            ep.value = prev.value.clone();
        }
        if ep.public_url.is_none() && ep.public_access {
            ep.public_url = prev.public_url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IssueCode, Provider};
    use serde_json::json;
    use proptest::prelude::*;

    const APP: &str = r#"{
        "name": "shop",
        "components": {
            "main": {
                "middlewareDependencies": {
                    "mainDb": { "technology": "postgresql", "required": ["database"], "config": { "user": "app" } }
                }
            }
        }
    }"#;

    fn merge(app: &str, deploy: &str) -> Result<ResolvedConfiguration> {
        let registry = StrategyRegistry::new();
        let app: ApplicationManifest = serde_json::from_str(app).unwrap();
        let deploy: DeploymentManifest = serde_json::from_str(deploy).unwrap();
        Merger::new(&registry, "dev").merge(&app, &deploy)
    }

    #[test]
    fn local_postgres_gets_default_endpoint() {
        let resolved = merge(
            APP,
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "mainDb": { "deploymentType": "local", "config": { "database": "appdb" } } } } } }"#,
        )
        .unwrap();

        let db = resolved.middleware("main", "mainDb").unwrap();
        assert_eq!(db.technology, "postgresql");
        let main = &db.endpoints["main"];
        assert_eq!(main.port, 5432);
        assert!(!main.public_access);
        assert_eq!(resolved.namespace, "shop-dev");
        assert_eq!(resolved.provider, Provider::Local);
    }

    #[test]
    fn missing_use_is_the_only_issue() {
        let err = merge(
            APP,
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "mainDb": { "deploymentType": "container", "config": { "database": "appdb" } } } } } }"#,
        )
        .unwrap_err();

        let Error::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
        let issue = &errors.issues()[0];
        assert_eq!(issue.code, IssueCode::MissingUseField);
        assert_eq!(issue.subject.as_deref(), Some("mainDb"));
    }

    #[test]
    fn config_is_deep_merged_with_deploy_winning() {
        let resolved = merge(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "cache": { "technology": "redis", "config": { "tuning": { "maxmemory": "64mb", "policy": "lru" } } } } } } }"#,
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "cache": { "deploymentType": "container", "use": "redis",
                           "config": { "tuning": { "maxmemory": "256mb" } } } } } } }"#,
        )
        .unwrap();
        let config = &resolved.middleware("main", "cache").unwrap().config;
        assert_eq!(config["tuning"], json!({ "maxmemory": "256mb", "policy": "lru" }));
    }

    #[test]
    fn public_access_precedence() {
        let resolved = merge(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "relay": { "technology": "centrifugo", "endpoints": { "main": { "publicAccess": false } } } } } } }"#,
            r#"{ "provider": "aws", "components": { "main": { "middlewareDependencies": {
                "relay": { "deploymentType": "container", "use": "centrifugo",
                           "endpoints": { "main": { "publicAccess": true } } } } } } }"#,
        )
        .unwrap();
        let relay = resolved.middleware("main", "relay").unwrap();
        assert!(relay.endpoints["main"].public_access);
        assert!(!relay.endpoints["grpc"].public_access);
    }

    #[test]
    fn empty_config_disables_declared_entry() {
        let resolved = merge(
            APP,
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "mainDb": { "deploymentType": "container", "use": "postgresql", "config": {} },
                "cache": { "deploymentType": "container", "use": "redis", "config": {} } } } } }"#,
        )
        .unwrap();
        assert!(!resolved.middleware("main", "mainDb").unwrap().enabled);
        // Undeclared support middleware has nothing to disable.
        assert!(resolved.middleware("main", "cache").unwrap().enabled);
    }

    #[test]
    fn previous_values_are_reused() {
        let deploy = r#"{ "provider": "aws", "components": { "main": { "middlewareDependencies": {
            "mainDb": { "deploymentType": "managed", "config": { "database": "appdb" } } } } } }"#;
        let mut first = merge(APP, deploy).unwrap();
        first
            .middleware_mut("main", "mainDb")
            .unwrap()
            .endpoints
            .get_mut("main")
            .unwrap()
            .value = Some("db.abc.rds.amazonaws.com:5432".to_string());

        let registry = StrategyRegistry::new();
        let app: ApplicationManifest = serde_json::from_str(APP).unwrap();
        let deploy: DeploymentManifest = serde_json::from_str(deploy).unwrap();
        let second = Merger::new(&registry, "dev")
            .with_previous(Some(&first))
            .merge(&app, &deploy)
            .unwrap();
        assert_eq!(
            second.middleware("main", "mainDb").unwrap().endpoints["main"].value.as_deref(),
            Some("db.abc.rds.amazonaws.com:5432")
        );

        // A previous run for another environment is ignored.
        let other = Merger::new(&registry, "prod")
            .with_previous(Some(&first))
            .merge(&app, &deploy)
            .unwrap();
        assert!(other.middleware("main", "mainDb").unwrap().endpoints["main"].value.is_none());
    }

    #[test]
    fn merge_is_deterministic_modulo_timestamp() {
        let deploy = r#"{ "provider": "local", "components": { "main": {
            "port": 8080, "image": "shop:dev",
            "middlewareDependencies": {
                "mainDb": { "deploymentType": "container", "use": "postgresql", "config": { "database": "appdb" } },
                "queue": { "deploymentType": "container", "use": "nats" } } } } }"#;
        let mut a = merge(APP, deploy).unwrap();
        let b = merge(APP, deploy).unwrap();
        a.generated_at = b.generated_at;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn deep_merge_replaces_scalars_and_arrays() {
        let mut target = json!({ "a": 1, "b": [1, 2], "c": { "d": 1 } })
            .as_object()
            .cloned()
            .unwrap();
        let overrides = json!({ "a": 2, "b": [3], "c": { "e": 2 } })
            .as_object()
            .cloned()
            .unwrap();
        deep_merge(&mut target, &overrides);
        assert_eq!(
            Value::Object(target),
            json!({ "a": 2, "b": [3], "c": { "d": 1, "e": 2 } })
        );
    }

    fn flat_map() -> impl Strategy<Value = Map<String, Value>> {
        proptest::collection::btree_map("[a-e]", 0i64..10, 0..6).prop_map(|m| {
            m.into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn overrides_win_and_merging_twice_changes_nothing(
            base in flat_map(),
            overrides in flat_map(),
        ) {
            let mut once = base.clone();
            deep_merge(&mut once, &overrides);
            for (key, value) in &overrides {
                prop_assert_eq!(once.get(key), Some(value));
            }
            for (key, value) in &base {
                if !overrides.contains_key(key) {
                    prop_assert_eq!(once.get(key), Some(value));
                }
            }

            let mut twice = once.clone();
            deep_merge(&mut twice, &overrides);
            prop_assert_eq!(once, twice);
        }
    }
}
