use super::common::{env_from_config, sized_resources};
use super::{
    ContainerSpec, EndpointDefinition, EnvContext, ManagedResource, ManagedResourceKind,
    ProvisioningStrategy, ResourceRequirements, Technology,
};
use crate::config::Provider;
use serde_json::{json, Map, Value};

const REPOSITORY: &str = "postgres";
const DEFAULT_VERSION: &str = "16";
const PORT: u16 = 5432;

pub struct PostgresStrategy;

impl ProvisioningStrategy for PostgresStrategy {
    fn technology(&self) -> Technology {
        Technology::Postgresql
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let mut spec = ContainerSpec::new("postgres", ctx.image_or(REPOSITORY, DEFAULT_VERSION));
        spec.env = env_from_config(
            ctx,
            &[
                ("database", "POSTGRES_DB"),
                ("user", "POSTGRES_USER"),
                ("password", "POSTGRES_PASSWORD"),
            ],
        );
        if spec.env.contains_key("POSTGRES_PASSWORD") {
            spec.env
                .insert("PGDATA".to_string(), "/var/lib/postgresql/data/pgdata".to_string());
        }
        spec
    }

    fn endpoint_definitions(&self, _ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        vec![EndpointDefinition::new(
            "main",
            PORT,
            "postgresql",
            "PostgreSQL wire protocol",
        )]
    }

    fn resources(&self, ctx: &EnvContext<'_>) -> ResourceRequirements {
        sized_resources(
            ctx.provider,
            ("100m", "256Mi", "500m", "512Mi"),
            ("250m", "512Mi", "1", "2Gi"),
        )
    }

    fn managed_kind(&self, provider: Provider) -> Option<ManagedResourceKind> {
        match provider {
            Provider::Aws => Some(ManagedResourceKind::AwsDbInstance),
            Provider::Gcp => Some(ManagedResourceKind::GcpSqlInstance),
            Provider::Local => None,
        }
    }

    fn managed_resource(&self, ctx: &EnvContext<'_>) -> Option<ManagedResource> {
        let kind = self.managed_kind(ctx.provider)?;
        let version = ctx.version_or(DEFAULT_VERSION);
        let major = version.split('.').next().unwrap_or(version);
        let name = ctx.service_base_name();

        let mut inputs = match kind {
            ManagedResourceKind::AwsDbInstance => json!({
                "identifier": name,
                "engine": "postgres",
                "engine_version": version,
                "instance_class": ctx.config_str("instanceClass").unwrap_or_else(|| "db.t3.micro".to_string()),
                "allocated_storage": ctx.config.get("storageGb").cloned().unwrap_or(json!(20)),
                "port": PORT,
            }),
            _ => json!({
                "name": name,
                "database_version": format!("POSTGRES_{}", major),
                "tier": ctx.config_str("tier").unwrap_or_else(|| "db-f1-micro".to_string()),
            }),
        };
        if let Value::Object(map) = &mut inputs {
            insert_present(map, ctx, "database", "db_name");
            insert_present(map, ctx, "user", "username");
            insert_present(map, ctx, "password", "password");
        }

        Some(ManagedResource {
            kind,
            inputs: match inputs {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        })
    }
}

fn insert_present(map: &mut Map<String, Value>, ctx: &EnvContext<'_>, key: &str, input: &str) {
    if let Some(value) = ctx.config_str(key) {
        map.insert(input.to_string(), Value::String(value));
    }
}
