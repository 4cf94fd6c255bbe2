use super::{
    ConfigFile, ContainerSpec, EndpointDefinition, EnvContext, ProvisioningStrategy, Technology,
};
use serde_json::{Map, Value};

const REPOSITORY: &str = "centrifugo/centrifugo";
const DEFAULT_VERSION: &str = "v5";
const HTTP_PORT: u16 = 8000;
const GRPC_PORT: u16 = 10000;
const CONFIG_DIR: &str = "/centrifugo";
const CONFIG_FILE: &str = "config.json";

pub struct CentrifugoStrategy;

/// manifest key -> centrifugo config key
const CONFIG_KEYS: &[(&str, &str)] = &[
    ("tokenSecret", "token_hmac_secret_key"),
    ("apiKey", "api_key"),
    ("adminPassword", "admin_password"),
    ("adminSecret", "admin_secret"),
    ("allowedOrigins", "allowed_origins"),
    ("presence", "presence"),
    ("historySize", "history_size"),
    ("historyTtl", "history_ttl"),
];

impl ProvisioningStrategy for CentrifugoStrategy {
    fn technology(&self) -> Technology {
        Technology::Centrifugo
    }

    fn container_spec(&self, ctx: &EnvContext<'_>) -> ContainerSpec {
        let mut spec =
            ContainerSpec::new("centrifugo", ctx.image_or(REPOSITORY, DEFAULT_VERSION));
        spec.command = vec!["centrifugo".to_string()];
        spec.args = vec![
            "--config".to_string(),
            format!("{}/{}", CONFIG_DIR, CONFIG_FILE),
        ];
        spec
    }

    fn endpoint_definitions(&self, _ctx: &EnvContext<'_>) -> Vec<EndpointDefinition> {
        vec![
            EndpointDefinition::new("main", HTTP_PORT, "http", "HTTP and WebSocket transport"),
            EndpointDefinition::new("grpc", GRPC_PORT, "grpc", "Server API over gRPC"),
        ]
    }

    fn config_file(&self, ctx: &EnvContext<'_>) -> Option<ConfigFile> {
        let mut doc = Map::new();
        doc.insert("port".to_string(), Value::from(HTTP_PORT));
        doc.insert("grpc_api".to_string(), Value::Bool(true));
        doc.insert("grpc_api_port".to_string(), Value::from(GRPC_PORT));
        for (key, target) in CONFIG_KEYS {
            if let Some(value) = ctx.config.get(*key).filter(|v| !v.is_null()) {
                doc.insert(target.to_string(), value.clone());
            }
        }
        if doc.contains_key("admin_password") {
            doc.insert("admin".to_string(), Value::Bool(true));
        }

        let content = serde_json::to_string_pretty(&Value::Object(doc)).ok()?;
        Some(ConfigFile {
            file_name: CONFIG_FILE.to_string(),
            mount_path: CONFIG_DIR.to_string(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::provisioning::ProvisioningSpec;

    #[test]
    fn renders_config_from_present_keys() {
        let mut config = Map::new();
        config.insert("apiKey".to_string(), "k".into());
        config.insert("allowedOrigins".to_string(), serde_json::json!(["http://localhost:3000"]));
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "centrifugo", &config)
            .with_middleware("relay");

        let file = CentrifugoStrategy.config_file(&ctx).unwrap();
        let doc: Value = serde_json::from_str(&file.content).unwrap();
        assert_eq!(doc["api_key"], "k");
        assert_eq!(doc["allowed_origins"][0], "http://localhost:3000");
        assert_eq!(doc["grpc_api_port"], 10000);
        assert!(doc.get("token_hmac_secret_key").is_none());
        assert!(doc.get("admin").is_none());
    }

    #[test]
    fn config_file_is_mounted_read_only() {
        let config = Map::new();
        let ctx = EnvContext::new(Provider::Local, "ns", "main", "centrifugo", &config);
        let ProvisioningSpec::Standalone(spec) = CentrifugoStrategy.provisioning_spec(&ctx) else {
            panic!("expected standalone");
        };
        let mount = &spec.container.volume_mounts[0];
        assert_eq!(mount.mount_path, "/centrifugo");
        assert!(mount.read_only);
        let ports: Vec<u16> = spec.container.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![8000, 10000]);
    }
}
