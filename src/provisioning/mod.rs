//! Per-technology provisioning strategies.
//!
//! A [`ProvisioningStrategy`] knows how one technology runs on the cluster:
//! its image, ports, environment, resources, helper containers and, where the
//! cloud offers one, its managed counterpart. The [`StrategyRegistry`] maps
//! technology ids to strategies and falls back to [`GenericStrategy`].

mod centrifugo;
pub mod common;
mod context;
mod generic;
mod nats;
mod postgres;
mod redis;
mod technology;
mod temporal;
mod types;

pub use centrifugo::CentrifugoStrategy;
pub use context::EnvContext;
pub use generic::GenericStrategy;
pub use nats::NatsStrategy;
pub use postgres::PostgresStrategy;
pub use redis::RedisStrategy;
pub use technology::{StrategyRegistry, Technology};
pub use temporal::TemporalStrategy;
pub use types::*;

use crate::config::Provider;

pub trait ProvisioningStrategy: Send + Sync {
    fn technology(&self) -> Technology;

    /// Main container: image, command, ports and environment.
    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec;

    /// Default endpoints, before manifest overrides.
    fn endpoint_definitions(&self, ctx: &EnvContext<'_>) -> Vec<EndpointDefinition>;

    fn resources(&self, ctx: &EnvContext<'_>) -> ResourceRequirements {
        common::default_resources(ctx.provider)
    }

    fn init_containers(&self, _ctx: &EnvContext<'_>) -> Vec<ContainerSpec> {
        Vec::new()
    }

    fn sidecars(&self, _ctx: &EnvContext<'_>) -> Vec<ContainerSpec> {
        Vec::new()
    }

    fn config_file(&self, _ctx: &EnvContext<'_>) -> Option<ConfigFile> {
        None
    }

    fn supports_distributed(&self) -> bool {
        false
    }

    fn distributed_services(&self, _ctx: &EnvContext<'_>) -> Vec<ServiceSpec> {
        Vec::new()
    }

    /// Managed resource type on `provider`, if the cloud offers one.
    fn managed_kind(&self, _provider: Provider) -> Option<ManagedResourceKind> {
        None
    }

    fn managed_resource(&self, _ctx: &EnvContext<'_>) -> Option<ManagedResource> {
        None
    }

    /// Full spec for a containerized entry.
    ///
    /// Distributed mode is used only when the entry asks for it and the
    /// strategy supports it.
    fn provisioning_spec(&self, ctx: &EnvContext<'_>) -> ProvisioningSpec {
        if ctx.distributed.is_some() {
            if self.supports_distributed() {
                let mut services = self.distributed_services(ctx);
                for service in &mut services {
                    apply_extra_env(&mut service.container, ctx);
                }
                return ProvisioningSpec::Distributed { services };
            }
            tracing::warn!(
                "{} does not support distributed mode; deploying {}.{} standalone",
                self.technology(),
                ctx.component,
                ctx.middleware.unwrap_or("-")
            );
        }

        let endpoints = resolve_endpoints(self.endpoint_definitions(ctx), ctx);
        let resources = self.resources(ctx);
        let config_file = self.config_file(ctx);
        let sidecars = self.sidecars(ctx);

        // Ports a sidecar declares are served by the sidecar.
        let main_ports: Vec<EndpointDefinition> = endpoints
            .iter()
            .filter(|ep| {
                !sidecars
                    .iter()
                    .any(|s| s.ports.iter().any(|p| p.name == ep.name))
            })
            .cloned()
            .collect();

        let mut container = self.container_spec(ctx);
        container.ports = common::container_ports(&main_ports);
        container.resources = Some(resources.clone());
        if let Some(file) = &config_file {
            container.volume_mounts.push(VolumeMount {
                name: "config".to_string(),
                mount_path: file.mount_path.clone(),
                read_only: true,
            });
        }
        apply_extra_env(&mut container, ctx);

        ProvisioningSpec::Standalone(StandaloneSpec {
            container,
            endpoints,
            resources,
            init_containers: self.init_containers(ctx),
            sidecars,
            config_file,
        })
    }
}

/// Final endpoint list: resolved endpoints when known, with the strategy's
/// container port kept as the target port.
pub fn resolve_endpoints(
    defaults: Vec<EndpointDefinition>,
    ctx: &EnvContext<'_>,
) -> Vec<EndpointDefinition> {
    let Some(resolved) = ctx.endpoints else {
        return defaults;
    };
    resolved
        .values()
        .map(|ep| {
            let default = defaults.iter().find(|d| d.name == ep.name);
            EndpointDefinition {
                name: ep.name.clone(),
                port: default.map(|d| d.port).unwrap_or(ep.port),
                protocol: ep.protocol.clone(),
                public_access: ep.public_access,
                description: default.map(|d| d.description.clone()).unwrap_or_default(),
            }
        })
        .collect()
}

/// Entry-level `env` wins over strategy-derived variables.
fn apply_extra_env(container: &mut ContainerSpec, ctx: &EnvContext<'_>) {
    if let Some(env) = ctx.env {
        for (key, value) in env {
            container.env.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributedSettings, Endpoint};
    use serde_json::Map;
    use std::collections::BTreeMap;

    #[test]
    fn distributed_only_when_selected() {
        let registry = StrategyRegistry::new();
        let temporal = registry.get(Technology::Temporal);
        let config = Map::new();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "temporal", &config)
            .with_middleware("workflows");
        assert!(!temporal.provisioning_spec(&ctx).is_distributed());

        let settings = DistributedSettings::default();
        let mut ctx = ctx.clone();
        ctx.distributed = Some(&settings);
        assert!(temporal.provisioning_spec(&ctx).is_distributed());

        // Strategies without a distributed mode ignore the request.
        let redis = registry.get(Technology::Redis);
        assert!(!redis.provisioning_spec(&ctx).is_distributed());
    }

    #[test]
    fn resolved_endpoints_keep_container_target_port() {
        let registry = StrategyRegistry::new();
        let postgres = registry.get(Technology::Postgresql);
        let config = Map::new();
        let mut endpoints = BTreeMap::new();
        let mut main = Endpoint::new("main", 15432, "postgresql");
        main.public_access = true;
        endpoints.insert("main".to_string(), main);

        let mut ctx = EnvContext::new(Provider::Aws, "ns", "main", "postgresql", &config)
            .with_middleware("db");
        ctx.endpoints = Some(&endpoints);

        let ProvisioningSpec::Standalone(spec) = postgres.provisioning_spec(&ctx) else {
            panic!("expected standalone");
        };
        assert_eq!(spec.endpoints[0].port, 5432);
        assert!(spec.endpoints[0].public_access);
        assert_eq!(spec.container.ports[0].port, 5432);
        assert!(spec.container.resources.is_some());
    }

    #[test]
    fn entry_env_overrides_strategy_env() {
        let registry = StrategyRegistry::new();
        let postgres = registry.get(Technology::Postgresql);
        let mut config = Map::new();
        config.insert("database".to_string(), "appdb".into());
        let mut env = BTreeMap::new();
        env.insert("POSTGRES_DB".to_string(), "override".to_string());

        let mut ctx = EnvContext::new(Provider::Local, "ns", "main", "postgresql", &config)
            .with_middleware("db");
        ctx.env = Some(&env);
        let ProvisioningSpec::Standalone(spec) = postgres.provisioning_spec(&ctx) else {
            panic!("expected standalone");
        };
        assert_eq!(spec.container.env["POSTGRES_DB"], "override");
    }
}
