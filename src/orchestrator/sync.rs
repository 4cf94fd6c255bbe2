//! Writing runtime values back into the resolved configuration.

use crate::artifact::{ArtifactGenerator, Discovery, DiscoveryKind};
use crate::config::{DeploymentType, EndpointKey, ResolvedConfiguration};
use crate::error::Result;
use crate::provisioning::StrategyRegistry;
use serde_json::Value;
use std::collections::BTreeMap;

/// Gives every endpoint with a known location its address.
///
/// Endpoints behind a generated service get the in-cluster DNS name. Components
/// running outside the cluster (`local`, or `skipProvisioning`) use their
/// declared host. Returns how many values changed.
pub(crate) fn fill_container_endpoints(
    config: &mut ResolvedConfiguration,
    registry: &StrategyRegistry,
) -> Result<usize> {
    let exposures = ArtifactGenerator::new(registry).exposures(config)?;
    let namespace = config.namespace.clone();
    let mut changed = 0;

    for exposure in &exposures {
        let address = exposure.cluster_address(&namespace);
        if let Some(endpoint) = config.endpoint_mut(&exposure.endpoint) {
            if endpoint.value.as_deref() != Some(address.as_str()) {
                endpoint.value = Some(address);
                changed += 1;
            }
        }
    }

    for component in config.components.values_mut() {
        let outside = component.deployment_type == DeploymentType::Local
            || component.skip_provisioning;
        let Some(host) = component.host.as_deref().filter(|_| outside) else {
            continue;
        };
        for endpoint in component.endpoints.values_mut() {
            let address = format!("{}:{}", host, endpoint.port);
            if endpoint.value.as_deref() != Some(address.as_str()) {
                endpoint.value = Some(address);
                changed += 1;
            }
        }
    }

    tracing::debug!("Filled {} endpoint value(s)", changed);
    Ok(changed)
}

/// Applies engine outputs to the endpoints they describe.
///
/// Missing or empty outputs are logged and skipped. Returns the number of
/// values that changed.
pub(crate) fn apply_discoveries(
    config: &mut ResolvedConfiguration,
    discoveries: &[Discovery],
    outputs: &BTreeMap<String, Value>,
    only: Option<DiscoveryKind>,
) -> usize {
    let mut changed = 0;
    for discovery in discoveries {
        if only.is_some_and(|kind| kind != discovery.kind) {
            continue;
        }
        let raw = match outputs.get(&discovery.output) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                tracing::warn!(
                    "Output '{}' for {} is missing or empty",
                    discovery.output,
                    discovery.endpoint
                );
                continue;
            }
            Some(other) => other.to_string(),
        };
        let Some(endpoint) = config.endpoint_mut(&discovery.endpoint) else {
            tracing::warn!(
                "Output '{}' names unknown endpoint {}",
                discovery.output,
                discovery.endpoint
            );
            continue;
        };

        let (slot, value) = match discovery.kind {
            DiscoveryKind::ManagedEndpoint => (&mut endpoint.value, raw),
            DiscoveryKind::PublicAddress => {
                let url = format!("{}://{}:{}", endpoint.url_scheme(), raw, endpoint.port);
                (&mut endpoint.public_url, url)
            }
        };
        if slot.as_deref() != Some(value.as_str()) {
            tracing::info!("Discovered {} = {}", discovery.endpoint, value);
            *slot = Some(value);
            changed += 1;
        }
    }
    changed
}

/// Managed entries whose endpoint is still unknown.
pub(crate) fn awaiting_managed(config: &ResolvedConfiguration) -> Vec<EndpointKey> {
    config
        .iter_middleware()
        .filter(|(_, _, mw)| mw.awaits_managed_endpoint())
        .flat_map(|(c, m, mw)| {
            mw.endpoints
                .values()
                .filter(|ep| ep.value.is_none())
                .map(move |ep| EndpointKey::middleware(c, m, &ep.name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolved_from_json;
    use serde_json::json;

    const APP: &str = r#"{ "components": { "main": { "middlewareDependencies": {
        "relay": { "technology": "centrifugo", "endpoints": { "main": { "publicAccess": true } } } } } } }"#;

    fn relay(provider: &str) -> ResolvedConfiguration {
        resolved_from_json(
            APP,
            &format!(
                r#"{{ "provider": "{}", "namespace": "shop", "components": {{ "main": {{
                    "image": "shop:1", "port": 3000,
                    "middlewareDependencies": {{ "relay": {{ "use": "centrifugo" }} }} }} }} }}"#,
                provider
            ),
        )
    }

    #[test]
    fn container_endpoints_get_cluster_addresses() {
        let mut config = relay("aws");
        let registry = StrategyRegistry::new();
        let changed = fill_container_endpoints(&mut config, &registry).unwrap();
        assert!(changed >= 2);

        let relay = config.middleware("main", "relay").unwrap();
        assert_eq!(
            relay.endpoints["main"].value.as_deref(),
            Some("main-relay.shop.svc.cluster.local:8000")
        );
        assert_eq!(
            relay.endpoints["grpc"].value.as_deref(),
            Some("main-relay-grpc.shop.svc.cluster.local:10000")
        );
        assert_eq!(fill_container_endpoints(&mut config, &registry).unwrap(), 0);
    }

    #[test]
    fn local_components_use_their_host() {
        let mut config = resolved_from_json(
            r#"{ "components": { "web": {} } }"#,
            r#"{ "provider": "local", "components": { "web": {
                "deploymentType": "local", "host": "127.0.0.1", "port": 5173 } } }"#,
        );
        fill_container_endpoints(&mut config, &StrategyRegistry::new()).unwrap();
        let web = &config.components["web"];
        assert!(web
            .endpoints
            .values()
            .all(|ep| ep.value.as_deref() == Some("127.0.0.1:5173")));
    }

    #[test]
    fn public_addresses_become_urls_and_empty_outputs_are_skipped() {
        let mut config = relay("aws");
        let key = EndpointKey::middleware("main", "relay", "main");
        let discoveries = vec![Discovery {
            output: "main_relay_service_public_address".to_string(),
            endpoint: key.clone(),
            kind: DiscoveryKind::PublicAddress,
        }];

        let mut outputs = BTreeMap::new();
        outputs.insert("main_relay_service_public_address".to_string(), json!(""));
        assert_eq!(apply_discoveries(&mut config, &discoveries, &outputs, None), 0);

        outputs.insert(
            "main_relay_service_public_address".to_string(),
            json!("lb-1.elb.amazonaws.com"),
        );
        assert_eq!(apply_discoveries(&mut config, &discoveries, &outputs, None), 1);
        assert_eq!(
            config.endpoint(&key).unwrap().public_url.as_deref(),
            Some("http://lb-1.elb.amazonaws.com:8000")
        );
        assert_eq!(apply_discoveries(&mut config, &discoveries, &outputs, None), 0);
        assert_eq!(
            apply_discoveries(
                &mut config,
                &discoveries,
                &BTreeMap::new(),
                Some(DiscoveryKind::ManagedEndpoint)
            ),
            0
        );
    }
}
