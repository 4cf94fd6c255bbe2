use super::{ContainerSpec, EndpointDefinition, EnvContext, ProvisioningStrategy, Technology};

const REPOSITORY: &str = "nats";
const DEFAULT_VERSION: &str = "2.10";
const CLIENT_PORT: u16 = 4222;
const MONITORING_PORT: u16 = 8222;

pub struct NatsStrategy;

impl ProvisioningStrategy for NatsStrategy {
    fn technology(&self) -> Technology {
        Technology::Nats
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let mut spec = ContainerSpec::new("nats", ctx.image_or(REPOSITORY, DEFAULT_VERSION));
        spec.args = vec![
            "--jetstream".to_string(),
            "--http_port".to_string(),
            MONITORING_PORT.to_string(),
        ];
        if let (Some(_), Some(_)) = (ctx.config_str("user"), ctx.config_str("password")) {
            spec.args.extend([
                "--user".to_string(),
                "$(NATS_USER)".to_string(),
                "--pass".to_string(),
                "$(NATS_PASSWORD)".to_string(),
            ]);
            spec.env = super::common::env_from_config(
                ctx,
                &[("user", "NATS_USER"), ("password", "NATS_PASSWORD")],
            );
        }
        spec
    }

    fn endpoint_definitions(&self, _ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        vec![
            EndpointDefinition::new("main", CLIENT_PORT, "nats", "Client connections"),
            EndpointDefinition::new("monitoring", MONITORING_PORT, "http", "HTTP monitoring"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use serde_json::Map;

    #[test]
    fn exposes_client_and_monitoring() {
        let config = Map::new();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "nats", &config);
        let ports: Vec<u16> = NatsStrategy
            .endpoint_definitions(&ctx)
            .iter()
            .map(|e| e.port)
            .collect();
        assert_eq!(ports, vec![4222, 8222]);
        assert!(NatsStrategy.container_spec(&ctx).env.is_empty());
    }
}
