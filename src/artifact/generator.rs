use super::{
    naming, ArtifactSet, Discovery, DiscoveryKind, ModuleDefinition, ModuleKind,
    OutputDefinition,
};
use crate::config::{
    DeploymentType, EndpointKey, Provider, ResolvedComponent, ResolvedConfiguration,
    ResolvedMiddleware,
};
use crate::provisioning::{
    common, ContainerPort, ContainerSpec, EnvContext, ProvisioningSpec, ServiceSpec,
    StandaloneSpec, StrategyRegistry, VolumeMount,
};
use crate::reference::{RefMap, ReferenceKind, ReferencePath};
use crate::{Error, Result};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

const STAGE: &str = "GenerateArtifacts";
const NAMESPACE_MODULE: &str = "namespace";
const RUNTIME_CONFIG_FILE: &str = "config.json";
const RUNTIME_CONFIG_DIR: &str = "/app/config";
const CONFIG_SOURCE_DIR: &str = "/config-source";

static MODULE_REF_REGEX: OnceLock<Regex> = OnceLock::new();

fn module_ref_regex() -> &'static Regex {
    MODULE_REF_REGEX.get_or_init(|| {
        Regex::new(r"\$\{module\.([A-Za-z0-9_]+)\.").expect("static regex pattern is valid")
    })
}

/// How one endpoint is reached inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    pub endpoint: EndpointKey,
    /// Kubernetes service name.
    pub service: String,
    /// Module that creates the service.
    pub module: String,
    /// Deployment backing the service.
    pub workload: String,
    pub port: u16,
    pub target_port: u16,
    pub public: bool,
}

impl Exposure {
    /// `<service>.<namespace>.svc.cluster.local:<port>`
    pub fn cluster_address(&self, namespace: &str) -> String {
        naming::cluster_address(&self.service, namespace, self.port)
    }
}

struct PortPlan {
    name: String,
    endpoint: Option<EndpointKey>,
    port: u16,
    target_port: u16,
}

struct ServicePlan {
    name: String,
    module: String,
    selector: BTreeMap<String, String>,
    ports: Vec<PortPlan>,
    public: bool,
    wait_for_load_balancer: bool,
}

/// One deployment and the services in front of it.
struct Workload {
    middleware: Option<(String, String)>,
    deployment: String,
    module: String,
    replicas: u32,
    labels: BTreeMap<String, String>,
    containers: Vec<ContainerSpec>,
    init_containers: Vec<ContainerSpec>,
    volumes: Vec<Value>,
    config_files: BTreeMap<String, String>,
    services: Vec<ServicePlan>,
    /// Service modules inside the same group that must exist first.
    after: Vec<String>,
    /// Middleware entries the workload talks to.
    references: BTreeSet<(String, String)>,
}

impl Workload {
    fn deployment_inputs(&self, namespace: &str) -> Result<Map<String, Value>> {
        let mut inputs = Map::new();
        inputs.insert("name".to_string(), json!(self.deployment));
        inputs.insert("namespace".to_string(), json!(namespace));
        inputs.insert("replicas".to_string(), json!(self.replicas));
        inputs.insert("labels".to_string(), serde_json::to_value(&self.labels)?);
        inputs.insert(
            "containers".to_string(),
            serde_json::to_value(&self.containers)?,
        );
        inputs.insert(
            "init_containers".to_string(),
            serde_json::to_value(&self.init_containers)?,
        );
        inputs.insert("volumes".to_string(), Value::Array(self.volumes.clone()));
        inputs.insert(
            "config_files".to_string(),
            serde_json::to_value(&self.config_files)?,
        );
        Ok(inputs)
    }
}

impl ServicePlan {
    fn inputs(&self, namespace: &str, provider: Provider) -> Result<Map<String, Value>> {
        let ports: Vec<Value> = self
            .ports
            .iter()
            .map(|p| json!({ "name": p.name, "port": p.port, "target_port": p.target_port }))
            .collect();
        let mut inputs = Map::new();
        inputs.insert("name".to_string(), json!(self.name));
        inputs.insert("namespace".to_string(), json!(namespace));
        inputs.insert("selector".to_string(), serde_json::to_value(&self.selector)?);
        inputs.insert(
            "service_type".to_string(),
            json!(service_type(provider, self.public)),
        );
        inputs.insert("ports".to_string(), Value::Array(ports));
        inputs.insert(
            "wait_for_load_balancer".to_string(),
            json!(self.wait_for_load_balancer),
        );
        Ok(inputs)
    }
}

/// `local` always uses NodePort; cloud providers expose public endpoints
/// through a load balancer and keep the rest cluster-internal.
fn service_type(provider: Provider, public: bool) -> &'static str {
    if provider.is_local() {
        "NodePort"
    } else if public {
        "LoadBalancer"
    } else {
        "ClusterIP"
    }
}

/// Port names are limited to 15 characters.
fn port_name(endpoint: &str) -> String {
    let mut name: String = naming::sanitize_dns(endpoint).chars().take(15).collect();
    while name.ends_with('-') {
        name.pop();
    }
    name
}

fn labels(app: &str, component: &str, role: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), app.to_string());
    labels.insert("app.kubernetes.io/part-of".to_string(), naming::sanitize_dns(component));
    labels.insert("app.kubernetes.io/managed-by".to_string(), "stackup".to_string());
    if let Some(role) = role {
        labels.insert("app.kubernetes.io/component".to_string(), role.to_string());
    }
    labels
}

fn selector(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

/// Builds Terraform artifacts and the endpoint exposure map.
pub struct ArtifactGenerator<'a> {
    registry: &'a StrategyRegistry,
}

impl<'a> ArtifactGenerator<'a> {
    pub fn new(registry: &'a StrategyRegistry) -> Self {
        Self { registry }
    }

    /// Every endpoint served by a generated service, in generation order.
    pub fn exposures(&self, config: &ResolvedConfiguration) -> Result<Vec<Exposure>> {
        let workloads = self.plan(config, &RefMap::default())?;
        let mut exposures = Vec::new();
        for workload in &workloads {
            for service in &workload.services {
                for port in &service.ports {
                    if let Some(key) = &port.endpoint {
                        exposures.push(Exposure {
                            endpoint: key.clone(),
                            service: service.name.clone(),
                            module: service.module.clone(),
                            workload: workload.deployment.clone(),
                            port: port.port,
                            target_port: port.target_port,
                            public: service.public,
                        });
                    }
                }
            }
        }
        Ok(exposures)
    }

    /// Full regeneration of the artifact set.
    pub fn generate(&self, config: &ResolvedConfiguration, refs: &RefMap) -> Result<ArtifactSet> {
        let provider = config.provider;
        let namespace = config.namespace.as_str();
        let mut modules = Vec::new();
        let mut outputs = Vec::new();
        let mut discoveries = Vec::new();

        let mut ns_inputs = Map::new();
        ns_inputs.insert("name".to_string(), json!(namespace));
        ns_inputs.insert(
            "labels".to_string(),
            json!({ "app.kubernetes.io/managed-by": "stackup" }),
        );
        modules.push(ModuleDefinition::new(
            NAMESPACE_MODULE,
            ModuleKind::Namespace,
            ns_inputs,
        ));

        // Managed resources; their endpoint output fills the deferred handles.
        let mut cloud_modules: BTreeMap<(String, String), String> = BTreeMap::new();
        for (c, m, mw) in config.iter_middleware() {
            if !mw.is_managed_resource() {
                continue;
            }
            let strategy = self.registry.create_or_generic(&mw.technology);
            let ctx = EnvContext::for_middleware(config, c, m, mw);
            let resource = strategy.managed_resource(&ctx).ok_or_else(|| {
                Error::provisioning(
                    STAGE,
                    format!(
                        "{}.{}: {} has no managed offering on {}",
                        c, m, mw.technology, provider
                    ),
                )
            })?;
            let name = naming::cloud_module_name(c, m);
            outputs.push(OutputDefinition {
                name: format!("{}_endpoint", name),
                value: format!("${{module.{}.endpoint}}", name),
            });
            let endpoint = if mw.endpoints.contains_key("main") {
                "main".to_string()
            } else {
                mw.endpoints.keys().next().cloned().unwrap_or_else(|| "main".to_string())
            };
            discoveries.push(Discovery {
                output: format!("{}_endpoint", name),
                endpoint: EndpointKey::middleware(c, m, &endpoint),
                kind: DiscoveryKind::ManagedEndpoint,
            });
            cloud_modules.insert((c.to_string(), m.to_string()), name.clone());
            modules.push(ModuleDefinition::new(
                name,
                ModuleKind::Cloud(resource.kind),
                resource.inputs,
            ));
        }

        let workloads = self.plan(config, refs)?;

        let mut services_of: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for workload in &workloads {
            if let Some(owner) = &workload.middleware {
                services_of
                    .entry(owner.clone())
                    .or_default()
                    .extend(workload.services.iter().map(|s| s.module.clone()));
            }
        }

        for workload in &workloads {
            let mut deployment = ModuleDefinition::new(
                workload.module.clone(),
                ModuleKind::Deployment,
                workload.deployment_inputs(namespace)?,
            );
            deployment.depends_on.extend(workload.after.iter().cloned());
            for owner in &workload.references {
                if let Some(services) = services_of.get(owner) {
                    deployment.depends_on.extend(services.iter().cloned());
                }
                if let Some(cloud) = cloud_modules.get(owner) {
                    deployment.depends_on.insert(cloud.clone());
                }
            }
            modules.push(deployment);

            for service in &workload.services {
                if provider.is_cloud() && service.public {
                    let output = format!("{}_public_address", service.module);
                    outputs.push(OutputDefinition {
                        name: output.clone(),
                        value: format!("${{module.{}.load_balancer_address}}", service.module),
                    });
                    for port in &service.ports {
                        if let Some(key) = &port.endpoint {
                            discoveries.push(Discovery {
                                output: output.clone(),
                                endpoint: key.clone(),
                                kind: DiscoveryKind::PublicAddress,
                            });
                        }
                    }
                }
                modules.push(ModuleDefinition::new(
                    service.module.clone(),
                    ModuleKind::Service,
                    service.inputs(namespace, provider)?,
                ));
            }
        }

        link_modules(&mut modules)?;

        tracing::debug!(
            "Generated {} modules, {} outputs for namespace {}",
            modules.len(),
            outputs.len(),
            namespace
        );

        Ok(ArtifactSet {
            provider,
            region: config.region.clone(),
            kube_context: config.kube_context.clone(),
            modules,
            outputs,
            discoveries,
        })
    }

    fn plan(&self, config: &ResolvedConfiguration, refs: &RefMap) -> Result<Vec<Workload>> {
        let mut workloads = Vec::new();
        for (c, component) in &config.components {
            for (m, mw) in &component.middleware_dependencies {
                if mw.is_provisioned_container() {
                    workloads.extend(self.middleware_workloads(config, c, m, mw));
                }
            }
        }
        for (c, component) in &config.components {
            if let Some(workload) = self.component_workload(config, refs, c, component)? {
                workloads.push(workload);
            }
        }
        Ok(workloads)
    }

    fn middleware_workloads(
        &self,
        config: &ResolvedConfiguration,
        component: &str,
        name: &str,
        mw: &ResolvedMiddleware,
    ) -> Vec<Workload> {
        let strategy = self.registry.create_or_generic(&mw.technology);
        let ctx = EnvContext::for_middleware(config, component, name, mw);
        let base = ctx.service_base_name();
        let references = mw_references(&mw.dependencies);

        match strategy.provisioning_spec(&ctx) {
            ProvisioningSpec::Standalone(spec) => vec![self.standalone_workload(
                config.provider,
                component,
                name,
                mw,
                &base,
                spec,
                references,
            )],
            ProvisioningSpec::Distributed { services } => services
                .into_iter()
                .map(|service| {
                    role_workload(
                        config.provider,
                        component,
                        name,
                        mw,
                        &base,
                        service,
                        references.clone(),
                    )
                })
                .collect(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn standalone_workload(
        &self,
        provider: Provider,
        component: &str,
        name: &str,
        mw: &ResolvedMiddleware,
        base: &str,
        spec: StandaloneSpec,
        references: BTreeSet<(String, String)>,
    ) -> Workload {
        let mut containers = vec![spec.container];
        containers.extend(spec.sidecars);

        let mut volumes = Vec::new();
        let mut config_files = BTreeMap::new();
        if let Some(file) = spec.config_file {
            volumes.push(json!({ "name": "config", "config_map": format!("{}-config", base) }));
            config_files.insert(file.file_name, file.content);
        }

        let services = spec
            .endpoints
            .iter()
            .map(|ep| {
                let service_name = naming::endpoint_service_name(base, &ep.name);
                let port = mw.endpoints.get(&ep.name).map(|e| e.port).unwrap_or(ep.port);
                ServicePlan {
                    module: naming::module_name(&[&service_name, "service"]),
                    name: service_name,
                    selector: selector(base),
                    ports: vec![PortPlan {
                        name: port_name(&ep.name),
                        endpoint: mw
                            .endpoints
                            .contains_key(&ep.name)
                            .then(|| EndpointKey::middleware(component, name, &ep.name)),
                        port,
                        target_port: ep.port,
                    }],
                    public: ep.public_access,
                    wait_for_load_balancer: provider.is_cloud() && ep.public_access,
                }
            })
            .collect();

        Workload {
            middleware: Some((component.to_string(), name.to_string())),
            deployment: base.to_string(),
            module: naming::module_name(&[base, "deployment"]),
            replicas: mw.replicas,
            labels: labels(base, component, None),
            containers,
            init_containers: spec.init_containers,
            volumes,
            config_files,
            services,
            after: Vec::new(),
            references,
        }
    }

    fn component_workload(
        &self,
        config: &ResolvedConfiguration,
        refs: &RefMap,
        name: &str,
        component: &ResolvedComponent,
    ) -> Result<Option<Workload>> {
        if component.skip_provisioning || component.deployment_type != DeploymentType::Container {
            return Ok(None);
        }
        if component.image.is_none() {
            return Err(Error::provisioning(
                STAGE,
                format!("component '{}' has no image to deploy", name),
            ));
        }

        let ctx = EnvContext::for_component(config, name, component);
        let app = ctx.service_base_name();
        let strategy = self.registry.create_or_generic("generic");

        let mut container = strategy.container_spec(&ctx);
        container.env.extend(component.env.clone());
        container.env.insert(
            "STACKUP_CONFIG".to_string(),
            format!("{}/{}", RUNTIME_CONFIG_DIR, RUNTIME_CONFIG_FILE),
        );
        container.ports = component
            .endpoints
            .values()
            .map(|ep| ContainerPort {
                name: port_name(&ep.name),
                port: ep.port,
            })
            .collect();
        container.resources = Some(common::default_resources(config.provider));
        container.volume_mounts.push(VolumeMount {
            name: "runtime-config".to_string(),
            mount_path: RUNTIME_CONFIG_DIR.to_string(),
            read_only: true,
        });

        let mut materialize = ContainerSpec::new("materialize-config", common::UTILITY_IMAGE)
            .shell(format!(
                "cp {src}/{file} {dst}/{file}",
                src = CONFIG_SOURCE_DIR,
                dst = RUNTIME_CONFIG_DIR,
                file = RUNTIME_CONFIG_FILE
            ));
        materialize.volume_mounts = vec![
            VolumeMount {
                name: "config-source".to_string(),
                mount_path: CONFIG_SOURCE_DIR.to_string(),
                read_only: true,
            },
            VolumeMount {
                name: "runtime-config".to_string(),
                mount_path: RUNTIME_CONFIG_DIR.to_string(),
                read_only: false,
            },
        ];

        let runtime = runtime_config(config, refs, name, component);
        let config_files = BTreeMap::from([(
            RUNTIME_CONFIG_FILE.to_string(),
            serde_json::to_string_pretty(&runtime)?,
        )]);

        let services = component
            .endpoints
            .values()
            .map(|ep| {
                let service_name = naming::endpoint_service_name(&app, &ep.name);
                ServicePlan {
                    module: naming::module_name(&[&service_name, "service"]),
                    name: service_name,
                    selector: selector(&app),
                    ports: vec![PortPlan {
                        name: port_name(&ep.name),
                        endpoint: Some(EndpointKey {
                            component: name.to_string(),
                            middleware: None,
                            endpoint: ep.name.clone(),
                        }),
                        port: ep.port,
                        target_port: ep.port,
                    }],
                    public: ep.public_access,
                    wait_for_load_balancer: config.provider.is_cloud() && ep.public_access,
                }
            })
            .collect();

        let mut references = mw_references(&component.dependencies);
        for (m, mw) in &component.middleware_dependencies {
            if mw.enabled {
                references.insert((name.to_string(), m.clone()));
            }
        }

        Ok(Some(Workload {
            middleware: None,
            deployment: app.clone(),
            module: naming::module_name(&[&app, "deployment"]),
            replicas: component.replicas,
            labels: labels(&app, name, None),
            containers: vec![container],
            init_containers: vec![materialize],
            volumes: vec![
                json!({ "name": "config-source", "config_map": format!("{}-config", app) }),
                json!({ "name": "runtime-config", "empty_dir": true }),
            ],
            config_files,
            services,
            after: Vec::new(),
            references,
        }))
    }
}

fn role_workload(
    provider: Provider,
    component: &str,
    name: &str,
    mw: &ResolvedMiddleware,
    base: &str,
    service: ServiceSpec,
    references: BTreeSet<(String, String)>,
) -> Workload {
    let role = service.name.clone();
    let role_base = naming::role_service_name(base, &role);

    let ports = service
        .endpoints
        .iter()
        .map(|ep| {
            let resolved = mw.endpoints.get(&ep.name);
            PortPlan {
                name: port_name(&ep.name),
                endpoint: resolved.map(|_| EndpointKey::middleware(component, name, &ep.name)),
                port: resolved.map(|e| e.port).unwrap_or(ep.port),
                target_port: ep.port,
            }
        })
        .collect();
    let public = service.endpoints.iter().any(|ep| ep.public_access);

    let after = service
        .depends_on
        .iter()
        .map(|dep| naming::module_name(&[&naming::role_service_name(base, dep), "service"]))
        .collect();

    let mut containers = vec![service.container];
    containers.extend(service.sidecars);

    Workload {
        middleware: Some((component.to_string(), name.to_string())),
        deployment: role_base.clone(),
        module: naming::module_name(&[&role_base, "deployment"]),
        replicas: service.replicas,
        labels: labels(&role_base, component, Some(&role)),
        containers,
        init_containers: service.init_containers,
        volumes: Vec::new(),
        config_files: BTreeMap::new(),
        services: vec![ServicePlan {
            module: naming::module_name(&[&role_base, "service"]),
            name: role_base.clone(),
            selector: selector(&role_base),
            ports,
            public,
            wait_for_load_balancer: service.wait_for_load_balancer
                || (provider.is_cloud() && public),
        }],
        after,
        references,
    }
}

/// `(component, middleware)` pairs named by a dependency list.
fn mw_references(dependencies: &[String]) -> BTreeSet<(String, String)> {
    dependencies
        .iter()
        .filter_map(|raw| raw.parse::<ReferencePath>().ok())
        .map(|path| (path.component, path.middleware))
        .collect()
}

/// Runtime configuration file handed to an application container.
fn runtime_config(
    config: &ResolvedConfiguration,
    refs: &RefMap,
    name: &str,
    component: &ResolvedComponent,
) -> Value {
    let middleware: Map<String, Value> = component
        .middleware_dependencies
        .iter()
        .map(|(m, mw)| {
            let endpoints: Map<String, Value> = mw
                .endpoints
                .iter()
                .map(|(e, ep)| {
                    let value = ep.value.clone().or_else(|| {
                        refs.get(&ReferencePath::endpoint(name, m.as_str(), e.as_str()))
                            .and_then(|r| match &r.kind {
                                ReferenceKind::Deferred(handle) => Some(handle.expression()),
                                ReferenceKind::Literal(v) => Some(v.clone()),
                            })
                    });
                    (
                        e.clone(),
                        json!({ "value": value, "publicUrl": ep.public_url }),
                    )
                })
                .collect();
            (
                m.clone(),
                json!({
                    "technology": mw.technology,
                    "enabled": mw.enabled,
                    "config": mw.config,
                    "endpoints": endpoints,
                }),
            )
        })
        .collect();

    let external: Map<String, Value> = component
        .external_services
        .iter()
        .map(|(s, svc)| {
            (
                s.clone(),
                json!({ "provider": svc.provider, "enabled": svc.enabled, "config": svc.config }),
            )
        })
        .collect();

    let references: Map<String, Value> = component
        .dependencies
        .iter()
        .filter_map(|raw| {
            let path = raw.parse::<ReferencePath>().ok()?;
            let value = match &refs.get(&path)?.kind {
                ReferenceKind::Literal(v) => v.clone(),
                ReferenceKind::Deferred(handle) => handle.expression(),
            };
            Some((raw.clone(), Value::String(value)))
        })
        .collect();

    json!({
        "component": name,
        "environment": config.environment,
        "namespace": config.namespace,
        "config": component.app_config,
        "middleware": middleware,
        "externalServices": external,
        "references": references,
    })
}

/// Adds the namespace edge and an edge for every `${module.X.` interpolation.
fn link_modules(modules: &mut [ModuleDefinition]) -> Result<()> {
    let names: BTreeSet<String> = modules.iter().map(|m| m.name.clone()).collect();
    for module in modules.iter_mut() {
        if module.name == NAMESPACE_MODULE {
            continue;
        }
        module.depends_on.insert(NAMESPACE_MODULE.to_string());
        let text = serde_json::to_string(&module.inputs)?;
        for caps in module_ref_regex().captures_iter(&text) {
            let target = &caps[1];
            if target != module.name && names.contains(target) {
                module.depends_on.insert(target.to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolved_from_json;

    const APP: &str = r#"{ "components": { "main": { "middlewareDependencies": {
        "relay": { "technology": "centrifugo", "endpoints": { "main": { "publicAccess": true } } } } } } }"#;

    fn relay_deploy(provider: &str) -> String {
        format!(
            r#"{{ "provider": "{}", "namespace": "shop", "components": {{ "main": {{
                "image": "shop:1", "port": 3000,
                "dependencies": ["components.main.middlewareDependencies.relay.endpoint"],
                "middlewareDependencies": {{
                    "relay": {{ "deploymentType": "container", "use": "centrifugo" }} }} }} }} }}"#,
            provider
        )
    }

    fn generate(config: &ResolvedConfiguration) -> ArtifactSet {
        let registry = StrategyRegistry::new();
        let (refs, _) = RefMap::build(config, false);
        ArtifactGenerator::new(&registry).generate(config, &refs).unwrap()
    }

    #[test]
    fn public_endpoint_gets_load_balancer_on_cloud_only() {
        let cloud = generate(&resolved_from_json(APP, &relay_deploy("aws")));
        let service = cloud.module("main_relay_service").unwrap();
        assert_eq!(service.inputs["service_type"], "LoadBalancer");
        assert_eq!(service.inputs["wait_for_load_balancer"], true);
        assert!(cloud
            .outputs
            .iter()
            .any(|o| o.name == "main_relay_service_public_address"));
        assert_eq!(cloud.discoveries.len(), 1);
        assert_eq!(cloud.discoveries[0].kind, DiscoveryKind::PublicAddress);
        // The grpc endpoint stays internal.
        assert_eq!(
            cloud.module("main_relay_grpc_service").unwrap().inputs["service_type"],
            "ClusterIP"
        );

        let local = generate(&resolved_from_json(APP, &relay_deploy("local")));
        let service = local.module("main_relay_service").unwrap();
        assert_eq!(service.inputs["service_type"], "NodePort");
        assert_eq!(service.inputs["wait_for_load_balancer"], false);
        assert!(local.outputs.is_empty());
        assert!(local.discoveries.is_empty());
    }

    #[test]
    fn every_module_depends_on_namespace_and_components_wait_for_middleware() {
        let set = generate(&resolved_from_json(APP, &relay_deploy("local")));
        for module in &set.modules {
            if module.name != "namespace" {
                assert!(module.depends_on.contains("namespace"), "{}", module.name);
            }
        }
        let app = set.module("main_deployment").unwrap();
        assert!(app.depends_on.contains("main_relay_service"));
        assert!(app.depends_on.contains("main_relay_grpc_service"));
        assert_eq!(app.inputs["init_containers"][0]["name"], "materialize-config");
        let runtime = app.inputs["config_files"]["config.json"].as_str().unwrap();
        assert!(runtime.contains("\"technology\": \"centrifugo\""));
    }

    #[test]
    fn distributed_roles_depend_on_frontend_service() {
        let config = resolved_from_json(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "workflows": { "technology": "temporal" } } } } }"#,
            r#"{ "provider": "local", "components": { "main": { "skipProvisioning": true,
                "middlewareDependencies": { "workflows": { "deploymentType": "container",
                    "use": "temporal", "distributed": { "historyReplicas": 2 } } } } } }"#,
        );
        let set = generate(&config);
        let history = set.module("main_workflows_history_deployment").unwrap();
        assert!(history
            .depends_on
            .contains("main_workflows_frontend_service"));
        assert_eq!(history.inputs["replicas"], 2);
        let frontend = set.module("main_workflows_frontend_deployment").unwrap();
        assert!(!frontend
            .depends_on
            .iter()
            .any(|d| d.starts_with("main_workflows_") && d.ends_with("_service")));
        assert!(set.module("main_workflows_admintools_service").is_some());
        assert!(set.module("main_deployment").is_none());

        let registry = StrategyRegistry::new();
        let exposures = ArtifactGenerator::new(&registry).exposures(&config).unwrap();
        let main = exposures
            .iter()
            .find(|e| e.endpoint.endpoint == "main")
            .unwrap();
        assert_eq!(main.service, "main-workflows-frontend");
        assert_eq!(main.workload, "main-workflows-frontend");
    }

    #[test]
    fn managed_middleware_becomes_cloud_module_with_discovery() {
        let config = resolved_from_json(
            r#"{ "components": { "main": { "middlewareDependencies": {
                "db": { "technology": "postgresql" } } } } }"#,
            r#"{ "provider": "aws", "components": { "main": { "image": "shop:1", "port": 3000,
                "env": { "DATABASE_URL": "${ref:components.main.middlewareDependencies.db.endpoint}" },
                "middlewareDependencies": { "db": { "deploymentType": "managed",
                    "config": { "database": "shop" } } } } } }"#,
        );
        let set = generate(&config);
        let cloud = set.module("main_db_cloud").unwrap();
        assert_eq!(
            cloud.kind,
            ModuleKind::Cloud(crate::provisioning::ManagedResourceKind::AwsDbInstance)
        );
        assert_eq!(set.cloud_targets(), vec!["module.main_db_cloud"]);
        assert!(set
            .discoveries
            .iter()
            .any(|d| d.kind == DiscoveryKind::ManagedEndpoint && d.endpoint.endpoint == "main"));
        assert!(set
            .module("main_deployment")
            .unwrap()
            .depends_on
            .contains("main_db_cloud"));
    }

    #[test]
    fn component_without_image_is_rejected() {
        let config = resolved_from_json(
            r#"{ "components": { "main": {} } }"#,
            r#"{ "provider": "local", "components": { "main": { "port": 3000 } } }"#,
        );
        let registry = StrategyRegistry::new();
        let err = ArtifactGenerator::new(&registry)
            .generate(&config, &RefMap::default())
            .unwrap_err();
        assert!(err.to_string().contains("no image"));
    }
}
