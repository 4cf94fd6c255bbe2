use super::common::{env_from_config, sized_resources};
use super::{
    ContainerSpec, EndpointDefinition, EnvContext, ManagedResource, ManagedResourceKind,
    ProvisioningStrategy, ResourceRequirements, Technology,
};
use crate::config::Provider;
use serde_json::{json, Value};

const REPOSITORY: &str = "redis";
const DEFAULT_VERSION: &str = "7";
const PORT: u16 = 6379;

pub struct RedisStrategy;

impl ProvisioningStrategy for RedisStrategy {
    fn technology(&self) -> Technology {
        Technology::Redis
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let mut spec = ContainerSpec::new("redis", ctx.image_or(REPOSITORY, DEFAULT_VERSION));
        spec.command = vec!["redis-server".to_string()];
        spec.args = vec!["--appendonly".to_string(), "yes".to_string()];
        if let Some(maxmemory) = ctx.config_str("maxmemory") {
            spec.args.extend(["--maxmemory".to_string(), maxmemory]);
        }
        if ctx.config_str("password").is_some() {
            // Read from the environment so the secret does not show up in `ps`.
            spec.args
                .extend(["--requirepass".to_string(), "$(REDIS_PASSWORD)".to_string()]);
        }
        spec.env = env_from_config(ctx, &[("password", "REDIS_PASSWORD")]);
        spec
    }

    fn endpoint_definitions(&self, _ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        vec![EndpointDefinition::new("main", PORT, "redis", "Redis protocol")]
    }

    fn resources(&self, ctx: &EnvContext<'_>) -> ResourceRequirements {
        sized_resources(
            ctx.provider,
            ("50m", "64Mi", "250m", "256Mi"),
            ("100m", "256Mi", "500m", "1Gi"),
        )
    }

    fn managed_kind(&self, provider: Provider) -> Option<ManagedResourceKind> {
        match provider {
            Provider::Aws => Some(ManagedResourceKind::AwsElasticache),
            Provider::Gcp => Some(ManagedResourceKind::GcpRedisInstance),
            Provider::Local => None,
        }
    }

    fn managed_resource(&self, ctx: &EnvContext<'_>) -> Option<ManagedResource> {
        let kind = self.managed_kind(ctx.provider)?;
        let name = ctx.service_base_name();
        let inputs = match kind {
            ManagedResourceKind::AwsElasticache => json!({
                "cluster_id": name,
                "engine_version": ctx.version_or("7.1"),
                "node_type": ctx.config_str("nodeType").unwrap_or_else(|| "cache.t3.micro".to_string()),
                "port": PORT,
            }),
            _ => json!({
                "name": name,
                "redis_version": format!("REDIS_{}", ctx.version_or("7.2").replace('.', "_")),
                "memory_size_gb": ctx.config.get("memorySizeGb").cloned().unwrap_or(json!(1)),
            }),
        };
        match inputs {
            Value::Object(inputs) => Some(ManagedResource { kind, inputs }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn password_is_passed_through_env() {
        let mut config = Map::new();
        config.insert("password".to_string(), "secret".into());
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "redis", &config)
            .with_middleware("cache");
        let spec = RedisStrategy.container_spec(&ctx);
        assert_eq!(spec.image, "redis:7");
        assert!(spec.args.contains(&"$(REDIS_PASSWORD)".to_string()));
        assert!(!spec.args.contains(&"secret".to_string()));
        assert_eq!(spec.env["REDIS_PASSWORD"], "secret");
    }

    #[test]
    fn no_password_no_auth() {
        let config = Map::new();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "redis", &config);
        let spec = RedisStrategy.container_spec(&ctx);
        assert!(!spec.args.contains(&"--requirepass".to_string()));
        assert!(spec.env.is_empty());
    }
}
