//! Temporal workflow engine.
//!
//! Standalone mode runs `temporalio/auto-setup` with the web UI as a sidecar.
//! Distributed mode splits the server into its roles. Only `frontend` applies
//! the database schema; the other roles wait for `frontend` and make sure the
//! default namespace is registered before they start.

use super::common::{env_from_config, split_host_port, wait_for_tcp};
use super::{
    ContainerPort, ContainerSpec, EndpointDefinition, EnvContext, ProvisioningStrategy,
    ResourceRequirements, ServiceSpec, Technology,
};
use std::collections::BTreeMap;

const AUTO_SETUP_REPOSITORY: &str = "temporalio/auto-setup";
const SERVER_REPOSITORY: &str = "temporalio/server";
const ADMIN_TOOLS_REPOSITORY: &str = "temporalio/admin-tools";
const UI_IMAGE: &str = "temporalio/ui:2.26.2";
const DEFAULT_VERSION: &str = "1.24.2";

const FRONTEND_PORT: u16 = 7233;
const UI_PORT: u16 = 8080;
const DEFAULT_DB_PORT: u16 = 5432;

/// Server roles and their gRPC ports, in start order.
const SERVER_ROLES: &[(&str, u16)] = &[
    ("frontend", FRONTEND_PORT),
    ("history", 7234),
    ("matching", 7235),
    ("worker", 7239),
];
const ADMIN_ROLE: &str = "admintools";

pub struct TemporalStrategy;

impl TemporalStrategy {
    fn database(&self, ctx: &EnvContext<'_>) -> Option<(String, u16)> {
        let host = ctx.config_str("dbHost")?;
        let (host, embedded_port) = split_host_port(&host, DEFAULT_DB_PORT);
        let port = ctx
            .config_str("dbPort")
            .and_then(|p| p.parse().ok())
            .unwrap_or(embedded_port);
        Some((host, port))
    }

    fn database_env(&self, ctx: &EnvContext<'_>) -> BTreeMap<String, String> {
        let mut env = env_from_config(
            ctx,
            &[("dbUser", "POSTGRES_USER"), ("dbPassword", "POSTGRES_PWD")],
        );
        if let Some((host, port)) = self.database(ctx) {
            env.insert("DB".to_string(), "postgres12".to_string());
            env.insert("POSTGRES_SEEDS".to_string(), host);
            env.insert("DB_PORT".to_string(), port.to_string());
        }
        env
    }

    fn ui_sidecar(&self, frontend_address: &str) -> ContainerSpec {
        let mut ui = ContainerSpec::new("temporal-ui", UI_IMAGE);
        ui.env.insert("TEMPORAL_ADDRESS".to_string(), frontend_address.to_string());
        ui.env.insert("TEMPORAL_UI_PORT".to_string(), UI_PORT.to_string());
        ui.ports = vec![ContainerPort {
            name: "ui".to_string(),
            port: UI_PORT,
        }];
        ui
    }

    fn schema_setup(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let version = ctx.version_or(DEFAULT_VERSION);
        let (host, port) = self
            .database(ctx)
            .unwrap_or_else(|| ("localhost".to_string(), DEFAULT_DB_PORT));
        let tool = format!(
            "temporal-sql-tool --plugin postgres12 --ep {} -p {} -u \"$SQL_USER\" --pw \"$SQL_PASSWORD\"",
            host, port
        );
        let script = [
            format!(
                "until nc -z {host} {port}; do echo waiting for database; sleep 2; done",
                host = host,
                port = port
            ),
            format!("{tool} --db temporal create-database || true"),
            format!("{tool} --db temporal setup-schema -v 0.0 || true"),
            format!(
                "{tool} --db temporal update-schema -d /etc/temporal/schema/postgresql/v12/temporal/versioned"
            ),
            format!("{tool} --db temporal_visibility create-database || true"),
            format!("{tool} --db temporal_visibility setup-schema -v 0.0 || true"),
            format!(
                "{tool} --db temporal_visibility update-schema -d /etc/temporal/schema/postgresql/v12/visibility/versioned"
            ),
        ]
        .join(" && ");

        let mut spec = ContainerSpec::new(
            "schema-setup",
            format!("{}:{}", ADMIN_TOOLS_REPOSITORY, version),
        )
        .shell(script);
        spec.env = env_from_config(
            ctx,
            &[("dbUser", "SQL_USER"), ("dbPassword", "SQL_PASSWORD")],
        );
        spec
    }

    fn register_defaults(&self, ctx: &EnvContext<'_>, frontend_host: &str) -> ContainerSpec {
        let version = ctx.version_or(DEFAULT_VERSION);
        let address = format!("{}:{}", frontend_host, FRONTEND_PORT);
        let namespace = ctx
            .config_str("defaultNamespace")
            .unwrap_or_else(|| "default".to_string());
        let script = format!(
            "until nc -z {host} {port}; do echo waiting for frontend; sleep 2; done && \
             (temporal operator namespace describe {ns} --address {addr} || \
              temporal operator namespace create {ns} --address {addr})",
            host = frontend_host,
            port = FRONTEND_PORT,
            ns = namespace,
            addr = address
        );
        ContainerSpec::new(
            "register-defaults",
            format!("{}:{}", ADMIN_TOOLS_REPOSITORY, version),
        )
        .shell(script)
    }

    fn role_endpoint(&self, role: &str, port: u16, public: bool) -> EndpointDefinition {
        let mut endpoint = if role == "frontend" {
            EndpointDefinition::new("main", port, "grpc", "Frontend gRPC API")
        } else {
            EndpointDefinition::new(role, port, "grpc", "Internal role port")
        };
        endpoint.public_access = public;
        endpoint
    }
}

impl ProvisioningStrategy for TemporalStrategy {
    fn technology(&self) -> Technology {
        Technology::Temporal
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let mut spec = ContainerSpec::new(
            "temporal",
            ctx.image_or(AUTO_SETUP_REPOSITORY, DEFAULT_VERSION),
        );
        spec.env = self.database_env(ctx);
        spec
    }

    fn endpoint_definitions(&self, _ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        vec![
            EndpointDefinition::new("main", FRONTEND_PORT, "grpc", "Frontend gRPC API"),
            EndpointDefinition::new("ui", UI_PORT, "http", "Web UI"),
        ]
    }

    fn resources(&self, ctx: &EnvContext<'_>) -> ResourceRequirements {
        super::common::sized_resources(
            ctx.provider,
            ("200m", "256Mi", "1", "1Gi"),
            ("500m", "1Gi", "2", "4Gi"),
        )
    }

    fn init_containers(&self, ctx: &EnvContext<'_>) -> Vec<ContainerSpec> {
        match self.database(ctx) {
            Some((host, port)) => vec![wait_for_tcp("wait-for-db", &host, port)],
            None => Vec::new(),
        }
    }

    fn sidecars(&self, _ctx: &EnvContext<'_>) -> Vec<ContainerSpec> {
        vec![self.ui_sidecar(&format!("127.0.0.1:{}", FRONTEND_PORT))]
    }

    fn supports_distributed(&self) -> bool {
        true
    }

    fn distributed_services(&self, ctx: &EnvContext<'_>) -> Vec<ServiceSpec> {
        let settings = ctx.distributed.cloned().unwrap_or_default();
        let version = ctx.version_or(DEFAULT_VERSION);
        let frontend_host = ctx.service_host(Some("frontend"));
        let resources = self.resources(ctx);
        let base_env = self.database_env(ctx);
        let cloud = ctx.provider.is_cloud();

        let mut services = Vec::new();
        for (role, port) in SERVER_ROLES {
            let public = *role == "frontend" && ctx.is_public("main");
            let endpoint = self.role_endpoint(role, *port, public);

            let mut container = ContainerSpec::new(
                format!("temporal-{}", role),
                ctx.image_or(SERVER_REPOSITORY, version),
            );
            container.env = base_env.clone();
            container.env.insert("SERVICES".to_string(), role.to_string());
            container.env.insert("BIND_ON_IP".to_string(), "0.0.0.0".to_string());
            if *role != "frontend" {
                container.env.insert(
                    "PUBLIC_FRONTEND_ADDRESS".to_string(),
                    format!("{}:{}", frontend_host, FRONTEND_PORT),
                );
            }
            container.ports = super::common::container_ports(std::slice::from_ref(&endpoint));
            container.resources = Some(resources.clone());

            let (init_containers, depends_on) = if *role == "frontend" {
                (vec![self.schema_setup(ctx)], Vec::new())
            } else {
                (
                    vec![self.register_defaults(ctx, &frontend_host)],
                    vec!["frontend".to_string()],
                )
            };

            services.push(ServiceSpec {
                name: role.to_string(),
                replicas: settings.replicas_for(role),
                container,
                init_containers,
                sidecars: Vec::new(),
                endpoints: vec![endpoint],
                depends_on,
                wait_for_load_balancer: cloud && public,
            });
        }

        let ui_public = ctx.is_public("ui");
        let mut ui_endpoint = EndpointDefinition::new("ui", UI_PORT, "http", "Web UI");
        ui_endpoint.public_access = ui_public;
        let frontend_address = format!("{}:{}", frontend_host, FRONTEND_PORT);

        let mut admin = ContainerSpec::new(
            "temporal-admintools",
            format!("{}:{}", ADMIN_TOOLS_REPOSITORY, version),
        )
        .shell("tail -f /dev/null");
        admin
            .env
            .insert("TEMPORAL_ADDRESS".to_string(), frontend_address.clone());

        services.push(ServiceSpec {
            name: ADMIN_ROLE.to_string(),
            replicas: settings.replicas_for(ADMIN_ROLE),
            container: admin,
            init_containers: vec![self.register_defaults(ctx, &frontend_host)],
            sidecars: vec![self.ui_sidecar(&frontend_address)],
            endpoints: vec![ui_endpoint],
            depends_on: vec!["frontend".to_string()],
            wait_for_load_balancer: cloud && ui_public,
        });

        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributedSettings, Provider};
    use crate::provisioning::ProvisioningSpec;
    use serde_json::Map;

    fn config() -> Map<String, serde_json::Value> {
        let mut config = Map::new();
        config.insert("dbHost".to_string(), "main-db.ns.svc.cluster.local:5432".into());
        config.insert("dbUser".to_string(), "temporal".into());
        config
    }

    #[test]
    fn distributed_mode_has_five_roles_with_frontend_first() {
        let config = config();
        let settings = DistributedSettings {
            frontend_replicas: Some(1),
            history_replicas: Some(2),
            ..Default::default()
        };
        let mut ctx = EnvContext::new(Provider::Local, "ns", "main", "temporal", &config)
            .with_middleware("workflows");
        ctx.distributed = Some(&settings);

        let ProvisioningSpec::Distributed { services } = TemporalStrategy.provisioning_spec(&ctx)
        else {
            panic!("expected distributed spec");
        };
        let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["frontend", "history", "matching", "worker", "admintools"]);

        let frontend = &services[0];
        assert_eq!(frontend.replicas, 1);
        assert!(frontend.depends_on.is_empty());
        assert_eq!(frontend.init_containers.len(), 1);
        assert_eq!(frontend.init_containers[0].name, "schema-setup");
        assert!(frontend.init_containers[0].args[0].contains("temporal-sql-tool"));

        assert_eq!(services[1].replicas, 2);
        for service in &services[1..] {
            assert_eq!(service.depends_on, vec!["frontend".to_string()]);
            assert!(service
                .init_containers
                .iter()
                .all(|c| !c.args.iter().any(|a| a.contains("temporal-sql-tool"))));
            assert!(service.init_containers[0].args[0]
                .contains("main-workflows-frontend.ns.svc.cluster.local"));
        }
    }

    #[test]
    fn standalone_waits_for_database_and_runs_ui_sidecar() {
        let config = config();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "temporal", &config)
            .with_middleware("workflows");
        let ProvisioningSpec::Standalone(spec) = TemporalStrategy.provisioning_spec(&ctx) else {
            panic!("expected standalone spec");
        };
        assert_eq!(spec.init_containers.len(), 1);
        assert!(spec.init_containers[0].args[0].contains("nc -z main-db.ns.svc.cluster.local 5432"));
        assert_eq!(spec.sidecars[0].env["TEMPORAL_ADDRESS"], "127.0.0.1:7233");
        assert_eq!(spec.container.env["POSTGRES_SEEDS"], "main-db.ns.svc.cluster.local");
        assert!(!spec.container.env.contains_key("POSTGRES_PWD"));
    }
}
