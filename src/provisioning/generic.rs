use super::common::to_env_name;
use super::{ContainerSpec, EndpointDefinition, EnvContext, ProvisioningStrategy, Technology};
use serde_json::Value;

const DEFAULT_PORT: u16 = 8080;

/// Applications, and middleware without a dedicated strategy.
///
/// Middleware config fields with scalar values become environment variables
/// (`maxConnections` -> `MAX_CONNECTIONS`). Application config is delivered as
/// a runtime config file instead, see the artifact generator.
pub struct GenericStrategy;

impl ProvisioningStrategy for GenericStrategy {
    fn technology(&self) -> Technology {
        Technology::Generic
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let image = match ctx.custom_image {
            Some(image) => image.to_string(),
            None => format!("{}:{}", ctx.technology, ctx.version.unwrap_or("latest")),
        };
        let name = match ctx.middleware {
            Some(_) => ctx.technology.to_string(),
            None => "app".to_string(),
        };
        let mut spec = ContainerSpec::new(name, image);

        if ctx.middleware.is_some() {
            for (key, value) in ctx.config {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                spec.env.insert(to_env_name(key), rendered);
            }
        }
        spec
    }

    fn endpoint_definitions(&self, ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        let port = ctx
            .config
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        vec![EndpointDefinition::new("main", port, "http", "Service port")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use serde_json::Map;

    #[test]
    fn port_from_config_or_8080() {
        let mut config = Map::new();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "minio", &config);
        assert_eq!(GenericStrategy.endpoint_definitions(&ctx)[0].port, 8080);

        config.insert("port".to_string(), 9000.into());
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "minio", &config);
        assert_eq!(GenericStrategy.endpoint_definitions(&ctx)[0].port, 9000);
    }

    #[test]
    fn unknown_middleware_uses_technology_as_image() {
        let mut config = Map::new();
        config.insert("rootUser".to_string(), "admin".into());
        config.insert("nested".to_string(), serde_json::json!({ "a": 1 }));
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "minio", &config)
            .with_middleware("storage");
        let spec = GenericStrategy.container_spec(&ctx);
        assert_eq!(spec.image, "minio:latest");
        assert_eq!(spec.env["ROOT_USER"], "admin");
        assert!(!spec.env.contains_key("NESTED"));
    }
}
